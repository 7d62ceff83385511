//! Common test utilities
//!
//! Connections are driven over an in-memory transport: a pair of channels
//! standing in for the two halves of a WebSocket.

#![allow(dead_code)]

use axum::extract::ws::Message;
use futures::channel::mpsc as fmpsc;
use futures::stream::BoxStream;
use futures::{Sink, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use civichub::auth::{AuthConfig, JwtAuth};
use civichub::config::HubConfig;
use civichub::gate::Admission;
use civichub::membership::InMemoryMembership;
use civichub::state::{AppState, Collaborators};
use civichub::store::{InMemoryMessageStore, MessageStore};
use civichub::ws::run_connection;

pub const SECRET: &str = "test-secret";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const SEED: &str = "g1=alice,bob,carol;g2=dave";

pub fn test_config() -> HubConfig {
    HubConfig {
        rate_limit: None,
        ..HubConfig::default()
    }
}

pub fn build_state(config: HubConfig, messages: Arc<dyn MessageStore>) -> Arc<AppState> {
    Arc::new(AppState::new(
        config,
        AuthConfig {
            token_secret: SECRET.to_string(),
            admin_token: Some(ADMIN_TOKEN.to_string()),
        },
        Collaborators {
            tokens: Arc::new(JwtAuth::new(SECRET)),
            membership: Arc::new(InMemoryMembership::from_seed(SEED)),
            messages,
        },
    ))
}

pub fn test_state() -> Arc<AppState> {
    build_state(test_config(), Arc::new(InMemoryMessageStore::new()))
}

pub fn token_for(user_id: &str) -> String {
    JwtAuth::new(SECRET)
        .issue(user_id, chrono::Duration::hours(1))
        .expect("token issue failed")
}

/// Client end of an in-memory connection
pub struct TestClient {
    /// Frames the client sends to the server
    pub outbound: fmpsc::UnboundedSender<Message>,
    /// Frames the server wrote to the socket
    pub inbound: BoxStream<'static, Message>,
    pub task: JoinHandle<()>,
}

impl TestClient {
    pub fn send(&self, message: Message) {
        self.outbound
            .unbounded_send(message)
            .expect("connection task gone");
    }

    pub fn send_json(&self, value: Value) {
        self.send(Message::Text(value.to_string().into()));
    }

    pub fn send_chat(&self, content: &str) {
        self.send_json(json!({
            "type": "send_message",
            "data": { "content": content }
        }));
    }

    /// Next raw frame, or None if nothing arrives within `wait`
    pub async fn next_frame(&mut self, wait: Duration) -> Option<Message> {
        tokio::time::timeout(wait, self.inbound.next())
            .await
            .ok()
            .flatten()
    }

    /// Next text frame parsed as JSON, skipping keepalive pings
    pub async fn next_json(&mut self) -> Value {
        loop {
            match self.next_frame(Duration::from_secs(2)).await {
                Some(Message::Text(text)) => {
                    return serde_json::from_str(text.as_str()).expect("server sent invalid JSON")
                }
                Some(Message::Ping(_)) => continue,
                other => panic!("Expected text frame, got {:?}", other),
            }
        }
    }

    /// Assert that no text frame arrives within a short window
    pub async fn expect_silence(&mut self) {
        loop {
            match self.next_frame(Duration::from_millis(150)).await {
                None => return,
                Some(Message::Ping(_)) => continue,
                Some(other) => panic!("Expected no frame, got {:?}", other),
            }
        }
    }

    /// Read everything the server writes until it closes the socket.
    /// Returns the frames seen, the Close frame last.
    pub async fn drain_until_closed(&mut self) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(Duration::from_secs(2)).await {
            let closed = matches!(frame, Message::Close(_));
            frames.push(frame);
            if closed {
                break;
            }
        }
        frames
    }

    /// Wait for the server side of the connection to finish on its own
    pub async fn wait_closed(self) {
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("connection did not shut down")
            .expect("connection task panicked");
    }

    /// Drop the client side and wait for the server task to finish
    pub async fn disconnect(self) {
        drop(self.outbound);
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("connection did not shut down")
            .expect("connection task panicked");
    }
}

/// Run an admitted connection over an in-memory transport and wait until the
/// hub has registered it
pub async fn connect(state: &Arc<AppState>, user_id: &str, group_id: &str) -> TestClient {
    let (server_sink, inbound) = fmpsc::unbounded::<Message>();
    spawn_connection(state, user_id, group_id, server_sink, inbound.boxed()).await
}

/// Like [`connect`], but the socket accepts one frame and then blocks every
/// write until the client starts reading `inbound`
pub async fn connect_stalled(state: &Arc<AppState>, user_id: &str, group_id: &str) -> TestClient {
    let (server_sink, inbound) = fmpsc::channel::<Message>(0);
    spawn_connection(state, user_id, group_id, server_sink, inbound.boxed()).await
}

async fn spawn_connection<W>(
    state: &Arc<AppState>,
    user_id: &str,
    group_id: &str,
    server_sink: W,
    inbound: BoxStream<'static, Message>,
) -> TestClient
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let before = state.hub.members(group_id).await.len();

    let (outbound, client_frames) = fmpsc::unbounded::<Message>();
    let server_stream = client_frames.map(Ok::<_, Infallible>);

    let admission = Admission {
        user_id: user_id.to_string(),
        group_id: group_id.to_string(),
    };
    let task = tokio::spawn(run_connection(
        server_sink,
        server_stream,
        admission,
        state.clone(),
    ));

    wait_for_members(state, group_id, before + 1).await;
    TestClient {
        outbound,
        inbound,
        task,
    }
}

/// Poll the hub snapshot until the group has `count` live connections
pub async fn wait_for_members(state: &Arc<AppState>, group_id: &str, count: usize) {
    for _ in 0..200 {
        if state.hub.members(group_id).await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "group {} never reached {} members (has {})",
        group_id,
        count,
        state.hub.members(group_id).await.len()
    );
}
