//! Message persistence

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{GroupId, Message, NewMessage};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    #[error("message rejected by store: {0}")]
    Rejected(String),
}

/// Durable home of chat messages. A message is only broadcast after `insert`
/// returned it with an id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;
}

/// Keeps messages in memory, grouped per chat group
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<GroupId, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent `limit` messages of a group, oldest first
    pub async fn recent(&self, group_id: &str, limit: usize) -> Vec<Message> {
        let messages = self.messages.read().await;
        match messages.get(group_id) {
            Some(list) => list[list.len().saturating_sub(limit)..].to_vec(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        if message.reply_to_id.is_some() {
            let messages = self.messages.read().await;
            let reply_to = message.reply_to_id.as_deref();
            let found = messages
                .get(&message.group_id)
                .is_some_and(|list| list.iter().any(|m| Some(m.id.as_str()) == reply_to));
            if !found {
                return Err(StoreError::Rejected(format!(
                    "reply target {} not found in group {}",
                    message.reply_to_id.unwrap_or_default(),
                    message.group_id
                )));
            }
        }

        let now = Utc::now();
        let stored = Message {
            id: ulid::Ulid::new().to_string(),
            group_id: message.group_id,
            user_id: message.user_id,
            content: message.content,
            kind: message.kind,
            media_url: message.media_url,
            reply_to_id: message.reply_to_id,
            created_at: now,
            updated_at: now,
            is_edited: false,
            is_deleted: false,
        };

        self.messages
            .write()
            .await
            .entry(stored.group_id.clone())
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }
}
