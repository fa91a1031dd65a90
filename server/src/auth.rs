//! API-key authentication for everything except the health endpoint.

use std::collections::HashSet;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::routes::AppState;

/// Opaque key check. An empty key set disables the check entirely, which
/// keeps local development usable without provisioning keys.
pub struct ApiKeyAuth {
    valid_keys: HashSet<String>,
}

impl ApiKeyAuth {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            valid_keys: keys.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.valid_keys.is_empty()
    }

    pub fn is_valid_key(&self, key: &str) -> bool {
        !self.is_enabled() || self.valid_keys.contains(key)
    }
}

/// Middleware guarding the authenticated routes. Health is wired outside
/// this layer and never passes through here.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if state.auth.is_valid_key(key) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "APIKey")],
        "Unauthorized: invalid API key",
    )
        .into_response()
}
