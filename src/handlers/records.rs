//! Record HTTP handlers.
//!
//! This module implements the record-facing API endpoints:
//! - POST /api/v1/records - Create (or deduplicate) a record
//! - POST /api/v1/records/manage - Owner-scoped list/delete commands
//! - GET /api/v1/records/{id}/image - Time-boxed image access reference

use crate::{
    error::AppError,
    middleware::identity::OwnerContext,
    models::record::{
        CreateRecordRequest, CreateRecordResponse, ImageReference, ManageOperation, ManageResult,
    },
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use tokio::time::timeout;

/// Create a record.
///
/// The creation limiter is checked first; a rate-limited caller gets 429
/// with the window reset time. The whole generate call runs under the
/// configured timeout so it either commits fully or leaves nothing visible.
///
/// # Request Body
///
/// ```json
/// { "destination": "example.com/landing", "label": "launch" }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "id": "01jf3x9z8kq2v7m4n6p8r0s2t4",
///   "destination": "https://example.com/landing",
///   "image_key": "qr/01jf3x9z8kq2v7m4n6p8r0s2t4.svg",
///   "tracking_address": "http://localhost:3000/r/01jf3x9z8kq2v7m4n6p8r0s2t4"
/// }
/// ```
pub async fn create_record(
    State(state): State<AppState>,
    Extension(identity): Extension<OwnerContext>,
    headers: HeaderMap,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), AppError> {
    let limiter_key = identity.limiter_identity(&headers);
    let decision = state.limiters.create.check(&limiter_key);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            reset_at: decision.reset_at,
        });
    }

    let result = timeout(
        state.config.request_timeout(),
        state.service.generate(
            &request.destination,
            request.label,
            identity.owner_id.as_deref(),
        ),
    )
    .await
    .map_err(|_| AppError::Upstream("record creation timed out".to_string()))
    .and_then(|inner| inner);

    let record = match result {
        Ok(record) => record,
        Err(err) => {
            // Failed attempts don't count against the window unless
            // configured to, so refund the charge on server faults.
            if err.is_server_fault() && !state.config.count_failed_requests {
                state.limiters.create.reset(&limiter_key);
            }
            return Err(err);
        }
    };

    let response = CreateRecordResponse {
        tracking_address: state.service.tracking_address(&record.id),
        id: record.id,
        destination: record.destination,
        image_key: record.image_key,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Dispatch a management command (list or delete).
///
/// The operation set is a closed tagged enum; anonymous callers are
/// rejected because both operations are owner-scoped.
///
/// # Request Body
///
/// ```json
/// { "operation": "list", "page": 1, "limit": 20 }
/// ```
pub async fn manage_records(
    State(state): State<AppState>,
    Extension(identity): Extension<OwnerContext>,
    Json(operation): Json<ManageOperation>,
) -> Result<Json<ManageResult>, AppError> {
    let owner_id = identity.owner_id.as_deref().ok_or(AppError::IdentityRequired)?;

    let result = state.service.manage(owner_id, operation).await?;
    Ok(Json(result))
}

/// Resolve the record's image key into a time-boxed access reference.
pub async fn image_reference(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageReference>, AppError> {
    let reference = state.service.image_reference(&id).await?;
    Ok(Json(reference))
}
