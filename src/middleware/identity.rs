//! Owner identity extraction middleware.
//!
//! The identity/session layer is an external collaborator; this middleware
//! only carries its result. It reads the opaque `X-Owner-Id` header into an
//! `OwnerContext` request extension and performs no authentication of its
//! own. Requests without the header proceed as anonymous.

use axum::{extract::Request, middleware::Next, response::Response};

/// Header supplied by the identity collaborator in front of this service.
pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Identity context attached to every API request.
///
/// Handlers extract this with `Extension<OwnerContext>`; `owner_id` is
/// `None` for anonymous callers.
#[derive(Debug, Clone, Default)]
pub struct OwnerContext {
    pub owner_id: Option<String>,
}

impl OwnerContext {
    /// The identity used to key rate-limit windows: the owner when known,
    /// otherwise the first forwarded hop, otherwise one shared anonymous
    /// bucket.
    pub fn limiter_identity(&self, headers: &axum::http::HeaderMap) -> String {
        if let Some(owner) = &self.owner_id {
            return format!("owner:{owner}");
        }
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match forwarded {
            Some(addr) => format!("addr:{addr}"),
            None => "anonymous".to_string(),
        }
    }
}

/// Attach an `OwnerContext` to the request.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let owner_id = request
        .headers()
        .get(OWNER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    request.extensions_mut().insert(OwnerContext { owner_id });

    next.run(request).await
}
