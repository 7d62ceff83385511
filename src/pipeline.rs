//! Message pipeline: validate, persist, then hand the stored message to the hub

use std::sync::Arc;

use crate::error::{HubError, HubResult};
use crate::hub::{BroadcastMessage, HubHandle};
use crate::protocol::{SendMessage, ServerMessage};
use crate::store::MessageStore;
use crate::types::{Client, Message, NewMessage};

#[derive(Clone)]
pub struct MessagePipeline {
    store: Arc<dyn MessageStore>,
    hub: HubHandle,
    max_content_chars: usize,
}

impl MessagePipeline {
    pub fn new(store: Arc<dyn MessageStore>, hub: HubHandle, max_content_chars: usize) -> Self {
        Self {
            store,
            hub,
            max_content_chars,
        }
    }

    /// Check the payload and turn it into a message ready for the store
    pub fn validate(&self, client: &Client, payload: SendMessage) -> HubResult<NewMessage> {
        let content = payload.content.trim();
        if content.is_empty() {
            return Err(HubError::InvalidPayload(
                "content must not be empty".to_string(),
            ));
        }
        let chars = content.chars().count();
        if chars > self.max_content_chars {
            return Err(HubError::InvalidPayload(format!(
                "content too long ({} > {} characters)",
                chars, self.max_content_chars
            )));
        }

        Ok(NewMessage {
            group_id: client.group_id.clone(),
            user_id: client.user_id.clone(),
            content: content.to_string(),
            kind: payload.kind,
            media_url: payload
                .media_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            reply_to_id: payload.reply_to_id.filter(|id| !id.is_empty()),
        })
    }

    /// Persist a message sent by `client` and fan it out to the rest of the
    /// group. Nothing is broadcast unless the store accepted the message.
    ///
    /// Once stored the message is returned even if the fan-out fails: it is
    /// durable, so the sender gets its ack and the others catch up on history.
    pub async fn submit(&self, client: &Client, payload: SendMessage) -> HubResult<Message> {
        let new_message = self.validate(client, payload)?;

        let message = self.store.insert(new_message).await.map_err(|e| {
            tracing::error!(
                group_id = %client.group_id,
                user_id = %client.user_id,
                "Failed to persist message: {}",
                e
            );
            HubError::PersistenceFailure(e.to_string())
        })?;

        tracing::debug!(
            group_id = %message.group_id,
            message_id = %message.id,
            "Message persisted"
        );

        if let Err(e) = self
            .hub
            .broadcast(
                BroadcastMessage::to_group(
                    message.group_id.clone(),
                    ServerMessage::NewMessage(message.clone()),
                )
                .excluding(client.id.clone()),
            )
            .await
        {
            tracing::error!(
                group_id = %message.group_id,
                message_id = %message.id,
                "Persisted message was not broadcast: {}",
                e
            );
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryMessageStore, StoreError};
    use crate::types::MessageKind;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn insert(&self, _message: NewMessage) -> Result<Message, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn payload(content: &str) -> SendMessage {
        SendMessage {
            content: content.to_string(),
            kind: MessageKind::Text,
            media_url: None,
            reply_to_id: None,
        }
    }

    fn client() -> Client {
        Client::new("alice".to_string(), "g1".to_string())
    }

    #[tokio::test]
    async fn test_validate_trims_content() {
        let pipeline = MessagePipeline::new(
            Arc::new(InMemoryMessageStore::new()),
            crate::hub::spawn(4),
            10,
        );
        let msg = pipeline.validate(&client(), payload("  hi  ")).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.group_id, "g1");
        assert_eq!(msg.user_id, "alice");
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_and_oversized() {
        let pipeline = MessagePipeline::new(
            Arc::new(InMemoryMessageStore::new()),
            crate::hub::spawn(4),
            10,
        );
        for content in ["", "   \n\t", "this is way too long"] {
            let err = pipeline.validate(&client(), payload(content)).unwrap_err();
            assert_eq!(err.code(), "INVALID_PAYLOAD", "content: {:?}", content);
        }
        // Limit counts characters, not bytes
        assert!(pipeline.validate(&client(), payload("ääääääääää")).is_ok());
    }

    #[tokio::test]
    async fn test_submit_persists() {
        let store = Arc::new(InMemoryMessageStore::new());
        let pipeline = MessagePipeline::new(store.clone(), crate::hub::spawn(4), 100);

        let message = pipeline.submit(&client(), payload("hello")).await.unwrap();
        assert_eq!(message.content, "hello");
        assert_eq!(store.recent("g1", 10).await, vec![message]);
    }

    #[tokio::test]
    async fn test_stored_message_is_acked_when_hub_is_gone() {
        let store = Arc::new(InMemoryMessageStore::new());
        let pipeline = MessagePipeline::new(store.clone(), crate::hub::closed(), 100);

        let message = pipeline.submit(&client(), payload("still saved")).await.unwrap();
        assert_eq!(message.content, "still saved");
        assert_eq!(store.recent("g1", 10).await, vec![message]);
    }

    #[tokio::test]
    async fn test_submit_reports_persistence_failure() {
        let pipeline = MessagePipeline::new(Arc::new(FailingStore), crate::hub::spawn(4), 100);
        let err = pipeline.submit(&client(), payload("hello")).await.unwrap_err();
        assert!(matches!(err, HubError::PersistenceFailure(_)));
    }
}
