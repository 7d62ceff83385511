//! HTTP endpoints next to the WebSocket route.
//!
//! Liveness, a read-only view of the hub, and an admin route for injecting
//! system messages into a group.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::HubError;
use crate::state::AppState;
use crate::types::is_valid_group_id;
use crate::ws;

/// Build the full application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route(
            "/api/groups/{group_id}/system-messages",
            post(post_system_message),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub groups: usize,
    pub connections: usize,
    /// Live connections per group
    pub members: BTreeMap<String, usize>,
}

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let snapshot = state.hub.snapshot().await;
    Json(StatsResponse {
        groups: snapshot.group_count(),
        connections: snapshot.connection_count(),
        members: snapshot
            .groups
            .iter()
            .map(|(group_id, members)| (group_id.clone(), members.len()))
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SystemMessageRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Inject a system message into a group.
///
/// POST /api/groups/{group_id}/system-messages
///
/// Requires `Authorization: Bearer <CHAT_ADMIN_TOKEN>`. Disabled entirely when
/// no admin token is configured.
pub async fn post_system_message(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SystemMessageRequest>,
) -> Response {
    if state.auth.admin_token.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "code": "ADMIN_DISABLED",
                "message": "admin API is not configured",
            })),
        )
            .into_response();
    }
    if !state.auth.is_admin(&headers) {
        tracing::warn!(group_id, "Rejected system message: bad admin token");
        return HubError::Unauthenticated.into_response();
    }
    if !is_valid_group_id(&group_id) {
        return HubError::BadRequest(format!("invalid group_id: {}", group_id)).into_response();
    }

    match state
        .hub
        .send_system_message(&group_id, &request.kind, request.data)
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response(),
        Err(e) => {
            tracing::warn!(group_id, "System message failed: {}", e);
            e.into_response()
        }
    }
}
