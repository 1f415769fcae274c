//! Tracking handlers: the scan path and signed image serving.

use crate::{
    error::AppError,
    models::scan_event::ScanMetadata,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tokio::time::timeout;

/// Resolve a tracking address: account for the scan, then redirect.
///
/// Uses 307 Temporary Redirect so browsers keep coming back through the
/// counter instead of caching a permanent redirect.
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let limiter_key = limiter_identity(&headers);
    let decision = state.limiters.track.check(&limiter_key);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            reset_at: decision.reset_at,
        });
    }

    let metadata = ScanMetadata::from_headers(&headers);
    let destination = timeout(
        state.config.request_timeout(),
        state.service.track(&id, metadata),
    )
    .await
    .map_err(|_| AppError::Upstream("scan accounting timed out".to_string()))??;

    Ok(Redirect::temporary(&destination))
}

/// Scanners are anonymous; key the limiter by forwarded address.
fn limiter_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|addr| format!("addr:{addr}"))
        .unwrap_or_else(|| "anonymous".to_string())
}

#[derive(Debug, Deserialize)]
pub struct ImageAccessParams {
    pub exp: i64,
    pub sig: String,
}

/// Serve a stored QR image when the signed reference checks out.
///
/// Expired or forged references are indistinguishable from missing images.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<ImageAccessParams>,
) -> Result<Response, AppError> {
    if !state.service.verify_image_access(&key, params.exp, &params.sig) {
        return Err(AppError::NotFound);
    }

    let bytes = state.service.load_image(&key).await?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], bytes).into_response())
}
