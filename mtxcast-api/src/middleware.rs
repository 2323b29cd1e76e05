//! Request middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, AppState};

pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Reject requests whose `X-API-Token` header does not match the configured
/// token. When no token is configured the API is open.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.api_token.as_deref() {
        let presented = request
            .headers()
            .get(API_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return Err(AppError::unauthorized("Invalid API token"));
        }
    }
    Ok(next.run(request).await)
}
