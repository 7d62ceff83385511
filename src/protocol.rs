//! Wire protocol: the `{type, group_id?, data?}` envelope in both directions.
//!
//! Inbound frames are decoded into a closed [`ClientAction`] set with an
//! explicit `Unknown` fallback, so unrecognized tags never reach business
//! logic. Outbound frames are built from [`ServerMessage`] and serialized once
//! per broadcast.

use crate::error::HubError;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope shared by client and server frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Payload of a `send_message` action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessage {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
}

/// Actions a client can send over its connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    SendMessage(SendMessage),
    Typing { group_id: Option<GroupId> },
    Ping,
    /// Any tag this server does not know; ignored
    Unknown(String),
}

impl ClientAction {
    /// Decode a text frame into an action.
    ///
    /// Fails with `InvalidPayload` when the frame is not an envelope or a known
    /// tag carries a malformed `data` payload.
    pub fn decode(text: &str) -> Result<Self, HubError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| HubError::InvalidPayload(format!("malformed envelope: {}", e)))?;

        match envelope.kind.as_str() {
            "send_message" => {
                let data = envelope.data.ok_or_else(|| {
                    HubError::InvalidPayload("send_message requires data".to_string())
                })?;
                let payload: SendMessage = serde_json::from_value(data).map_err(|e| {
                    HubError::InvalidPayload(format!("malformed send_message: {}", e))
                })?;
                Ok(ClientAction::SendMessage(payload))
            }
            "typing" => Ok(ClientAction::Typing {
                group_id: envelope.group_id,
            }),
            "ping" => Ok(ClientAction::Ping),
            _ => Ok(ClientAction::Unknown(envelope.kind)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingInfo {
    pub user_id: UserId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Tags the server emits for its own frames; system messages may not reuse them
pub const RESERVED_KINDS: &[&str] = &["new_message", "message_ack", "user_typing", "pong", "error"];

pub fn is_reserved_kind(kind: &str) -> bool {
    RESERVED_KINDS.contains(&kind)
}

/// Frames the server sends to clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// A persisted chat message, fanned out to the group
    NewMessage(Message),
    /// Confirmation sent only to the connection that sent the message
    MessageAck(Message),
    UserTyping(TypingInfo),
    Pong,
    Error(ErrorInfo),
    /// Server-originated event injected by another subsystem
    System {
        kind: String,
        group_id: GroupId,
        data: Value,
    },
}

impl ServerMessage {
    pub fn error(err: &HubError) -> Self {
        ServerMessage::Error(ErrorInfo {
            code: err.code().to_string(),
            message: err.to_string(),
        })
    }

    /// Wire tag of this message
    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::NewMessage(_) => "new_message",
            ServerMessage::MessageAck(_) => "message_ack",
            ServerMessage::UserTyping(_) => "user_typing",
            ServerMessage::Pong => "pong",
            ServerMessage::Error(_) => "error",
            ServerMessage::System { kind, .. } => kind,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let (group_id, data) = match self {
            ServerMessage::NewMessage(m) | ServerMessage::MessageAck(m) => {
                (Some(m.group_id.clone()), Some(serde_json::to_value(m)?))
            }
            ServerMessage::UserTyping(t) => {
                (Some(t.group_id.clone()), Some(serde_json::to_value(t)?))
            }
            ServerMessage::Pong => (None, None),
            ServerMessage::Error(e) => (None, Some(serde_json::to_value(e)?)),
            ServerMessage::System { group_id, data, .. } => {
                (Some(group_id.clone()), Some(data.clone()))
            }
        };

        Ok(Envelope {
            kind: self.kind().to_string(),
            group_id,
            data,
        })
    }

    /// Serialize to the JSON text sent on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }
}
