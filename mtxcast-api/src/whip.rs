//! WHIP HTTP endpoints
//!
//! HTTP framing for the WebRTC-HTTP Ingestion Protocol: `POST /whip` with an
//! `application/sdp` offer returns `201 Created` with the answer SDP and a
//! `Location` header naming the session resource; `DELETE /whip/{id}` tears
//! it down.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{error::AppResult, AppState};

pub const CLIENT_HEADER: &str = "x-client";

/// `POST /whip`
pub async fn post_offer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    let client_info = headers
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    info!(
        client = client_info.as_deref().unwrap_or("unknown"),
        "WHIP offer received"
    );

    let (answer_sdp, resource_id) = state.whip.handle_offer(&body, client_info).await?;

    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, "application/sdp".to_string()),
            (header::LOCATION, format!("/whip/{resource_id}")),
            (header::ALLOW, "DELETE".to_string()),
        ],
        answer_sdp,
    )
        .into_response())
}

/// `DELETE /whip/{resource_id}` — idempotent teardown.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> StatusCode {
    state.whip.delete_resource(&resource_id).await;
    StatusCode::NO_CONTENT
}
