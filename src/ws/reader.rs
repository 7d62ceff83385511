//! Read pump: decodes inbound frames and dispatches actions.
//!
//! This is the only place that decides a connection is over. Whatever ends it
//! (close frame, socket error, idle deadline, oversize frame, the write pump
//! exiting), the pump returns and the caller sends a single unregister.

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::handlers;
use crate::error::HubError;
use crate::hub::Frame;
use crate::protocol::{ClientAction, ServerMessage};
use crate::state::AppState;
use crate::types::Client;

/// Run until the connection ends. Returns `None` for an orderly close and the
/// fault otherwise.
pub(crate) async fn read_pump<R, E>(
    mut stream: R,
    client: &Client,
    outbound: mpsc::WeakSender<Frame>,
    mut writer_done: oneshot::Receiver<()>,
    state: &Arc<AppState>,
) -> Option<HubError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let pong_wait = state.config.pong_wait;
    let max_bytes = state.config.max_message_bytes;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            _ = &mut writer_done => {
                return Some(HubError::TransportFailure("write pump stopped".to_string()));
            }
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                return Some(HubError::TransportFailure(format!(
                    "no pong within {:?}",
                    pong_wait
                )));
            }
            Ok(None) => return None,
            Ok(Some(Err(e))) => return Some(HubError::TransportFailure(e.to_string())),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if text.as_str().len() > max_bytes {
                    return Some(oversize(text.as_str().len(), max_bytes));
                }
                tracing::debug!(connection_id = %client.id, "Received frame: {}", text.as_str());

                let reply = match ClientAction::decode(text.as_str()) {
                    Ok(action) => handlers::handle_action(action, client, state).await,
                    Err(e) => {
                        tracing::debug!(connection_id = %client.id, "Dropping frame: {}", e);
                        Some(ServerMessage::error(&e))
                    }
                };

                if let Some(reply) = reply {
                    if let Err(e) = reply_direct(&outbound, &reply) {
                        return Some(e);
                    }
                }
            }
            Message::Binary(data) => {
                if data.len() > max_bytes {
                    return Some(oversize(data.len(), max_bytes));
                }
                tracing::debug!(connection_id = %client.id, "Ignoring binary frame");
            }
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
            }
            // The transport answers pings on its own
            Message::Ping(_) => {}
            Message::Close(_) => return None,
        }
    }
}

fn oversize(len: usize, max_bytes: usize) -> HubError {
    HubError::TransportFailure(format!(
        "message of {} bytes exceeds limit of {}",
        len, max_bytes
    ))
}

/// Put a reply on this connection's own queue without blocking.
///
/// The weak handle fails to upgrade once the hub has dropped the connection,
/// in which case there is nobody left to write to.
fn reply_direct(outbound: &mpsc::WeakSender<Frame>, reply: &ServerMessage) -> Result<(), HubError> {
    let Some(queue) = outbound.upgrade() else {
        return Err(HubError::HubClosed);
    };
    let frame: Frame = match reply.encode() {
        Ok(text) => text.into(),
        Err(e) => {
            tracing::error!("Failed to encode reply: {}", e);
            return Ok(());
        }
    };
    queue.try_send(frame).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => HubError::SlowConsumer,
        mpsc::error::TrySendError::Closed(_) => HubError::HubClosed,
    })
}
