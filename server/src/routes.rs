//! HTTP surface: the websocket upgrade at `/ws` (authenticated) and the
//! unauthenticated `/health` probe.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::auth::{self, ApiKeyAuth};
use crate::connection;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub auth: Arc<ApiKeyAuth>,
    pub frontend_origin: Option<String>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    // route_layer only wraps the routes registered before it, which keeps
    // /health outside authentication.
    Router::new()
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed();
    Json(json!({
        "status": "ok",
        "uptime": format!("{}s", uptime.as_secs()),
    }))
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(expected) = &state.frontend_origin {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok());
        if origin != Some(expected.as_str()) {
            tracing::warn!(?origin, "websocket upgrade from unexpected origin");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| connection::serve(socket, hub))
}
