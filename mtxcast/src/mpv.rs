//! mpv renderer transport
//!
//! Drives a running mpv instance over its JSON IPC unix socket. Each command
//! opens a fresh connection, sends one request line and reads until the
//! matching response; mpv interleaves event lines on the same stream and
//! those are skipped.
//!
//! Live WHIP tracks cannot be handed to mpv directly, so the transport
//! bridges them: RTP packets are forwarded to a loopback UDP port and mpv is
//! pointed at a generated SDP description of that session.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UdpSocket, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mtxcast_core::transport::{LiveTrack, PlaybackMetrics, PlayerTransport};
use mtxcast_core::{Error, Result};

use crate::inhibitor::SleepInhibitor;

pub struct MpvTransport {
    socket_path: PathBuf,
    rtp_port: u16,
    inhibitor: Arc<SleepInhibitor>,
    /// Forwarder task of the currently attached live track, if any.
    live_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Deserialize)]
struct IpcResponse {
    error: String,
    #[serde(default)]
    data: Option<Value>,
}

impl MpvTransport {
    #[must_use]
    pub fn new(socket_path: PathBuf, rtp_port: u16, inhibitor: Arc<SleepInhibitor>) -> Self {
        Self {
            socket_path,
            rtp_port,
            inhibitor,
            live_task: Mutex::new(None),
        }
    }

    /// Send one IPC command and return its `data` payload.
    async fn command(&self, stage: &str, command: Value) -> Result<Option<Value>> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::playback(stage, format!("mpv socket unavailable: {e}")))?;
        let (reader, mut writer) = stream.into_split();

        let request = json!({ "command": command }).to_string();
        writer
            .write_all(request.as_bytes())
            .await
            .map_err(|e| Error::playback(stage, e.to_string()))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| Error::playback(stage, e.to_string()))?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::playback(stage, e.to_string()))?
        {
            // Event notifications share the stream with responses.
            if let Ok(response) = serde_json::from_str::<IpcResponse>(&line) {
                if response.error == "success" {
                    return Ok(response.data);
                }
                return Err(Error::playback(
                    stage,
                    format!("mpv rejected command: {}", response.error),
                ));
            }
        }
        Err(Error::playback(stage, "mpv closed the connection"))
    }

    async fn set_property(&self, stage: &str, name: &str, value: Value) -> Result<()> {
        self.command(stage, json!(["set_property", name, value]))
            .await?;
        Ok(())
    }

    /// Read a property, treating "property unavailable" (nothing loaded yet)
    /// as absent rather than an error.
    async fn try_get_property(&self, name: &str) -> Result<Option<Value>> {
        match self.command("metrics", json!(["get_property", name])).await {
            Ok(data) => Ok(data),
            Err(e) if e.to_string().contains("property unavailable") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn loadfile(&self, stage: &str, target: &str, options: &str) -> Result<()> {
        let command = if options.is_empty() {
            json!(["loadfile", target, "replace"])
        } else {
            json!(["loadfile", target, "replace", options])
        };
        self.command(stage, command).await?;
        // loadfile leaves the pause state untouched; make playback explicit.
        self.set_property(stage, "pause", json!(false)).await
    }

    async fn apply_title(&self, stage: &str, title: Option<&str>) -> Result<()> {
        if let Some(title) = title {
            self.set_property(stage, "force-media-title", json!(title))
                .await?;
        }
        Ok(())
    }

    async fn stop_live_forwarder(&self) {
        if let Some(task) = self.live_task.lock().await.take() {
            task.abort();
            debug!("Live RTP forwarder stopped");
        }
    }
}

#[async_trait]
impl PlayerTransport for MpvTransport {
    async fn play_url(&self, url: &str, start_time: f64, title: Option<&str>) -> Result<()> {
        self.stop_live_forwarder().await;
        self.apply_title("play", title).await?;
        self.loadfile("play", url, &format!("start={start_time}"))
            .await?;
        self.inhibitor.acquire().await;
        info!(start_time, "mpv playback started");
        Ok(())
    }

    async fn play_separated_streams(
        &self,
        video_url: &str,
        audio_url: &str,
        start_time: f64,
        title: Option<&str>,
    ) -> Result<()> {
        self.stop_live_forwarder().await;
        self.apply_title("play", title).await?;
        self.loadfile(
            "play",
            video_url,
            &format!("start={start_time},audio-file={audio_url}"),
        )
        .await?;
        self.inhibitor.acquire().await;
        info!(start_time, "mpv separated-stream playback started");
        Ok(())
    }

    async fn attach_live_track(&self, track: Arc<dyn LiveTrack>) -> Result<()> {
        self.stop_live_forwarder().await;

        let codec = track.codec();
        let sdp_path = write_session_description(self.rtp_port, &codec)
            .await
            .map_err(|e| Error::playback("live", format!("cannot write SDP: {e}")))?;

        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::playback("live", e.to_string()))?;
        socket
            .connect(("127.0.0.1", self.rtp_port))
            .await
            .map_err(|e| Error::playback("live", e.to_string()))?;

        let forwarder = tokio::spawn(async move {
            loop {
                match track.read_rtp().await {
                    Ok(packet) => {
                        if let Err(e) = socket.send(&packet).await {
                            warn!(error = %e, "RTP forward failed, stopping");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(reason = %e, "Live track ended");
                        break;
                    }
                }
            }
        });
        *self.live_task.lock().await = Some(forwarder);

        self.apply_title("live", Some("Live WHIP Stream")).await?;
        // ffmpeg refuses SDP-described UDP/RTP input unless whitelisted.
        self.set_property(
            "live",
            "demuxer-lavf-o",
            json!({ "protocol_whitelist": "file,udp,rtp" }),
        )
        .await?;
        self.loadfile("live", &sdp_path.display().to_string(), "")
            .await?;
        self.inhibitor.acquire().await;
        info!(mime_type = %codec.mime_type, rtp_port = self.rtp_port, "mpv live playback started");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.set_property("pause", "pause", json!(true)).await?;
        self.inhibitor.release().await;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.set_property("resume", "pause", json!(false)).await?;
        self.inhibitor.acquire().await;
        Ok(())
    }

    async fn seek(&self, position: f64) -> Result<()> {
        self.command("seek", json!(["seek", position, "absolute"]))
            .await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        // mpv volume is a percentage.
        self.set_property("volume", "volume", json!(volume * 100.0))
            .await
    }

    async fn get_metrics(&self) -> Result<PlaybackMetrics> {
        let position = self.try_get_property("time-pos").await?.and_then(as_f64);
        let duration = self.try_get_property("duration").await?.and_then(as_f64);
        let is_seekable = self
            .try_get_property("seekable")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(PlaybackMetrics {
            position,
            duration,
            is_seekable,
        })
    }

    async fn stop(&self) -> Result<()> {
        self.stop_live_forwarder().await;
        self.command("stop", json!(["stop"])).await?;
        self.inhibitor.release().await;
        Ok(())
    }
}

fn as_f64(value: Value) -> Option<f64> {
    value.as_f64()
}

/// Write an SDP file describing the loopback RTP session for one track.
async fn write_session_description(
    rtp_port: u16,
    codec: &mtxcast_core::transport::RtpCodecParams,
) -> std::io::Result<PathBuf> {
    let media_kind = if codec.mime_type.starts_with("audio/") {
        "audio"
    } else {
        "video"
    };
    let encoding = codec
        .mime_type
        .split_once('/')
        .map_or(codec.mime_type.as_str(), |(_, name)| name);
    let sdp = format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 127.0.0.1\r\n\
         s=mtxcast-live\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m={media_kind} {rtp_port} RTP/AVP {payload_type}\r\n\
         a=rtpmap:{payload_type} {encoding}/{clock_rate}\r\n",
        payload_type = codec.payload_type,
        clock_rate = codec.clock_rate,
    );
    let path = std::env::temp_dir().join("mtxcast-live.sdp");
    tokio::fs::write(&path, sdp).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtxcast_core::transport::RtpCodecParams;

    #[tokio::test]
    async fn test_session_description_names_codec_and_port() {
        let codec = RtpCodecParams {
            mime_type: "video/H264".to_string(),
            clock_rate: 90_000,
            payload_type: 96,
        };
        let path = write_session_description(5004, &codec).await.expect("sdp");
        let sdp = tokio::fs::read_to_string(&path).await.expect("read");
        assert!(sdp.contains("m=video 5004 RTP/AVP 96"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000"));
    }

    #[tokio::test]
    async fn test_session_description_for_audio_track() {
        let codec = RtpCodecParams {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            payload_type: 111,
        };
        let path = write_session_description(5006, &codec).await.expect("sdp");
        let sdp = tokio::fs::read_to_string(&path).await.expect("read");
        assert!(sdp.contains("m=audio 5006 RTP/AVP 111"));
        assert!(sdp.contains("a=rtpmap:111 opus/48000"));
    }

    #[tokio::test]
    async fn test_command_fails_without_socket() {
        let transport = MpvTransport::new(
            PathBuf::from("/nonexistent/mpv.sock"),
            5004,
            Arc::new(SleepInhibitor::new(false)),
        );
        let err = transport.pause().await.expect_err("socket is absent");
        assert!(err.to_string().contains("mpv socket unavailable"));
    }
}
