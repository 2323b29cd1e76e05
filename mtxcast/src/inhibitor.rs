//! System sleep inhibition
//!
//! Keeps the machine awake while media is playing by holding a
//! `systemd-inhibit` child process. The lock is released by killing the
//! child; `kill_on_drop` covers the crash path.

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct SleepInhibitor {
    enabled: bool,
    child: Mutex<Option<Child>>,
}

impl SleepInhibitor {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            child: Mutex::new(None),
        }
    }

    /// Take the inhibit lock. Idempotent; a failure to spawn is logged and
    /// otherwise ignored so playback never depends on it.
    pub async fn acquire(&self) {
        if !self.enabled {
            return;
        }
        let mut child = self.child.lock().await;
        if child.is_some() {
            return;
        }
        let spawned = Command::new("systemd-inhibit")
            .args([
                "--what=idle:sleep",
                "--who=mtxcast",
                "--why=Media playback in progress",
                "--mode=block",
                "sleep",
                "infinity",
            ])
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(process) => {
                debug!("Sleep inhibit lock acquired");
                *child = Some(process);
            }
            Err(e) => {
                warn!(error = %e, "Failed to acquire sleep inhibit lock");
            }
        }
    }

    /// Release the inhibit lock if held.
    pub async fn release(&self) {
        let mut child = self.child.lock().await;
        if let Some(mut process) = child.take() {
            if let Err(e) = process.kill().await {
                warn!(error = %e, "Failed to release sleep inhibit lock");
            } else {
                debug!("Sleep inhibit lock released");
            }
        }
    }
}
