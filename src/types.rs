use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for readability
pub type UserId = String;
pub type GroupId = String;
pub type MessageId = String;
pub type ConnectionId = String;

/// Maximum length of a group identifier accepted at the gate
pub const MAX_GROUP_ID_LEN: usize = 64;

/// Check that a group id is non-empty, bounded and made of URL-safe characters
pub fn is_valid_group_id(group_id: &str) -> bool {
    !group_id.is_empty()
        && group_id.len() <= MAX_GROUP_ID_LEN
        && group_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
    System,
}

/// A chat message after it has been accepted by the message store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_edited: bool,
    pub is_deleted: bool,
}

/// A validated message that has not been persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub reply_to_id: Option<MessageId>,
}

/// Identity of one live connection.
///
/// A connection is bound to exactly one group for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub group_id: GroupId,
}

impl Client {
    pub fn new(user_id: UserId, group_id: GroupId) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            user_id,
            group_id,
        }
    }
}
