//! Playback control and status endpoints

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use mtxcast_core::PlayerStatus;

use crate::{error::AppResult, AppState};

/// `GET /status` — full status snapshot with metrics refreshed from the
/// renderer.
pub async fn get_status(State(state): State<AppState>) -> AppResult<Json<PlayerStatus>> {
    let status = state.manager.current_status().await?;
    Ok(Json(status))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayingResponse {
    pub is_playing: bool,
}

/// `POST /control/play`
pub async fn control_play(State(state): State<AppState>) -> AppResult<Json<PlayingResponse>> {
    let status = state.manager.play().await?;
    Ok(Json(PlayingResponse {
        is_playing: status.is_playing,
    }))
}

/// `POST /control/pause`
pub async fn control_pause(State(state): State<AppState>) -> AppResult<Json<PlayingResponse>> {
    let status = state.manager.pause().await?;
    Ok(Json(PlayingResponse {
        is_playing: status.is_playing,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub stream_type: String,
    pub is_playing: bool,
}

/// `POST /control/stop`
pub async fn control_stop(State(state): State<AppState>) -> AppResult<Json<StopResponse>> {
    let status = state.manager.stop().await?;
    Ok(Json(StopResponse {
        stream_type: status.stream_type.as_str().to_string(),
        is_playing: status.is_playing,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeekResponse {
    pub position: f64,
    pub stream_type: String,
}

/// `POST /control/seek`
pub async fn control_seek(
    State(state): State<AppState>,
    Json(req): Json<SeekRequest>,
) -> AppResult<Json<SeekResponse>> {
    let status = state.manager.seek(req.position).await?;
    Ok(Json(SeekResponse {
        position: req.position,
        stream_type: status.stream_type.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VolumeResponse {
    pub volume: f64,
}

/// `POST /control/volume` — the stored (clamped) volume is echoed back.
pub async fn control_volume(
    State(state): State<AppState>,
    Json(req): Json<VolumeRequest>,
) -> AppResult<Json<VolumeResponse>> {
    let status = state.manager.set_volume(req.volume).await?;
    Ok(Json(VolumeResponse {
        volume: status.volume,
    }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
