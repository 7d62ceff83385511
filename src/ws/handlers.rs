//! Client action dispatch
//!
//! Every decoded action from a connection lands here. The return value is an
//! optional direct reply that goes back to the same connection only; anything
//! meant for the group goes through the hub.

use crate::error::HubError;
use crate::hub::BroadcastMessage;
use crate::protocol::{ClientAction, SendMessage, ServerMessage, TypingInfo};
use crate::state::AppState;
use crate::types::Client;
use std::sync::Arc;

/// Macro to apply the per-connection rate limit and return early when exceeded
macro_rules! check_rate {
    ($state:expr, $client:expr) => {
        if let Some(limiter) = &$state.limiter {
            if !limiter.check(&$client.id).await {
                tracing::warn!(
                    connection_id = %$client.id,
                    user_id = %$client.user_id,
                    "Action rate limited"
                );
                return Some(ServerMessage::error(&HubError::RateLimited));
            }
        }
    };
}

/// Handle one client action and return an optional reply for the sender
pub async fn handle_action(
    action: ClientAction,
    client: &Client,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match action {
        ClientAction::SendMessage(payload) => {
            check_rate!(state, client);
            handle_send_message(state, client, payload).await
        }

        ClientAction::Typing { group_id } => {
            check_rate!(state, client);
            handle_typing(state, client, group_id).await
        }

        ClientAction::Ping => Some(ServerMessage::Pong),

        ClientAction::Unknown(kind) => {
            tracing::debug!(connection_id = %client.id, kind, "Ignoring unknown action");
            None
        }
    }
}

async fn handle_send_message(
    state: &Arc<AppState>,
    client: &Client,
    payload: SendMessage,
) -> Option<ServerMessage> {
    match state.pipeline.submit(client, payload).await {
        Ok(message) => {
            tracing::info!(
                group_id = %client.group_id,
                user_id = %client.user_id,
                message_id = %message.id,
                "Message sent"
            );
            Some(ServerMessage::MessageAck(message))
        }
        Err(e) => {
            tracing::info!(connection_id = %client.id, "Message rejected: {}", e);
            Some(ServerMessage::error(&e))
        }
    }
}

async fn handle_typing(
    state: &Arc<AppState>,
    client: &Client,
    group_id: Option<String>,
) -> Option<ServerMessage> {
    if let Some(target) = group_id {
        if target != client.group_id {
            return Some(ServerMessage::error(&HubError::InvalidPayload(format!(
                "connection is subscribed to {}, not {}",
                client.group_id, target
            ))));
        }
    }

    let notice = ServerMessage::UserTyping(TypingInfo {
        user_id: client.user_id.clone(),
        group_id: client.group_id.clone(),
    });
    // Ephemeral: no persistence, no retry
    if let Err(e) = state
        .hub
        .broadcast(BroadcastMessage::to_group(client.group_id.clone(), notice).excluding(client.id.clone()))
        .await
    {
        tracing::warn!(connection_id = %client.id, "Dropping typing notice: {}", e);
    }
    None
}
