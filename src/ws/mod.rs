pub mod handlers;
mod reader;
mod writer;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::gate::Admission;
use crate::hub::{Frame, Member};
use crate::state::AppState;
use crate::types::Client;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub group_id: Option<String>,
}

/// WebSocket upgrade handler
///
/// Admission runs before the upgrade so a rejected client gets a plain HTTP
/// status instead of a socket that closes immediately.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    tracing::info!(group_id = ?params.group_id, "WebSocket connection request");

    let admission = match state
        .gate
        .admit(params.token.as_deref(), params.group_id.as_deref())
        .await
    {
        Ok(admission) => admission,
        Err(e) => {
            tracing::info!(group_id = ?params.group_id, "Connection refused: {}", e);
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_bytes = state.config.max_message_bytes;
    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| serve(socket, admission, state))
}

async fn serve(socket: WebSocket, admission: Admission, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, admission, state).await;
}

/// Drive one admitted connection until it ends
///
/// Registers the client with the hub, spawns the write pump and runs the read
/// pump on the current task. When the read pump returns the client is
/// unregistered exactly once, which closes its queue and lets the writer
/// finish.
pub async fn run_connection<W, R, E>(sink: W, stream: R, admission: Admission, state: Arc<AppState>)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let client = Client::new(admission.user_id, admission.group_id);
    let (tx, rx) = mpsc::channel::<Frame>(state.config.queue_capacity);
    let outbound = tx.downgrade();

    if let Err(e) = state.hub.register(Member::new(client.clone(), tx)) {
        tracing::error!(connection_id = %client.id, "Failed to register connection: {}", e);
        return;
    }

    tracing::info!(
        connection_id = %client.id,
        user_id = %client.user_id,
        group_id = %client.group_id,
        "WebSocket connected"
    );

    let (done_tx, done_rx) = oneshot::channel();
    let writer = tokio::spawn(writer::write_pump(sink, rx, state.config.clone(), done_tx));

    let reason = reader::read_pump(stream, &client, outbound, done_rx, &state).await;

    state.hub.unregister(&client);
    if let Some(limiter) = &state.limiter {
        limiter.forget(&client.id).await;
    }

    match reason {
        None => tracing::info!(connection_id = %client.id, "WebSocket closed"),
        Some(e) => tracing::info!(connection_id = %client.id, "WebSocket dropped: {}", e),
    }

    match writer.await {
        Ok(Some(e)) => tracing::debug!(connection_id = %client.id, "Write pump failed: {}", e),
        Ok(None) => {}
        Err(e) => tracing::error!(connection_id = %client.id, "Write pump panicked: {}", e),
    }
}
