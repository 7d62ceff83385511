//! The hub: single owner of "which connections belong to which group".
//!
//! One control task consumes three channels (`register`, `unregister`,
//! `broadcast`) and is the only code that touches the membership map. Every
//! other task talks to it through a cloneable [`HubHandle`].
//!
//! Fan-out never blocks: each member's outbound queue is bounded and written
//! with `try_send`. A member whose queue is full is evicted on the spot, which
//! drops the hub's (only) strong sender for that queue. The connection's write
//! pump sees the closed queue, sends a Close frame and exits.

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::error::{HubError, HubResult};
use crate::protocol::{is_reserved_kind, ServerMessage};
use crate::types::{Client, ConnectionId, GroupId, UserId};

/// One encoded text frame, cheap to clone across all members of a group
pub type Frame = Utf8Bytes;

/// Registry entry for one connection. Owns the strong end of its outbound queue.
#[derive(Debug)]
pub struct Member {
    pub client: Client,
    queue: mpsc::Sender<Frame>,
}

impl Member {
    pub fn new(client: Client, queue: mpsc::Sender<Frame>) -> Self {
        Self { client, queue }
    }
}

/// One fan-out event
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub group_id: GroupId,
    pub message: ServerMessage,
    /// Connection that must not receive this event (the sender)
    pub exclude: Option<ConnectionId>,
}

impl BroadcastMessage {
    pub fn to_group(group_id: impl Into<GroupId>, message: ServerMessage) -> Self {
        Self {
            group_id: group_id.into(),
            message,
            exclude: None,
        }
    }

    pub fn excluding(mut self, connection_id: impl Into<ConnectionId>) -> Self {
        self.exclude = Some(connection_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Read-only copy of the registry, republished by the hub after every change
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubSnapshot {
    pub groups: HashMap<GroupId, Vec<MemberInfo>>,
}

impl HubSnapshot {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn connection_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn members(&self, group_id: &str) -> &[MemberInfo] {
        self.groups.get(group_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Sending side of the hub's three input channels
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Member>,
    unregister_tx: mpsc::UnboundedSender<Client>,
    broadcast_tx: mpsc::Sender<BroadcastMessage>,
    snapshot: Arc<RwLock<HubSnapshot>>,
}

impl HubHandle {
    pub fn register(&self, member: Member) -> HubResult<()> {
        self.register_tx.send(member).map_err(|_| HubError::HubClosed)
    }

    /// Ask the hub to drop a connection. Unknown connections are ignored, so
    /// calling this for an already evicted client is harmless.
    pub fn unregister(&self, client: &Client) {
        if self.unregister_tx.send(client.clone()).is_err() {
            tracing::debug!(connection_id = %client.id, "Hub gone, skipping unregister");
        }
    }

    /// Queue a fan-out event. Waits only when the hub's own input channel is
    /// full, never on individual members.
    pub async fn broadcast(&self, message: BroadcastMessage) -> HubResult<()> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Inject a server-originated event into a group, bypassing any client
    pub async fn send_system_message(
        &self,
        group_id: &str,
        kind: &str,
        data: Value,
    ) -> HubResult<()> {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(HubError::InvalidPayload(
                "system message type must not be empty".to_string(),
            ));
        }
        if is_reserved_kind(kind) {
            return Err(HubError::InvalidPayload(format!(
                "system message type {:?} is reserved",
                kind
            )));
        }
        tracing::info!(group_id, kind, "Injecting system message");
        self.broadcast(BroadcastMessage::to_group(
            group_id,
            ServerMessage::System {
                kind: kind.to_string(),
                group_id: group_id.to_string(),
                data,
            },
        ))
        .await
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn members(&self, group_id: &str) -> Vec<MemberInfo> {
        self.snapshot.read().await.members(group_id).to_vec()
    }
}

/// Start the hub control task and return its handle. The task ends once every
/// handle has been dropped.
pub fn spawn(broadcast_capacity: usize) -> HubHandle {
    let (register_tx, register_rx) = mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_capacity.max(1));
    let snapshot = Arc::new(RwLock::new(HubSnapshot::default()));

    let hub = Hub {
        groups: HashMap::new(),
        snapshot: snapshot.clone(),
    };
    tokio::spawn(hub.run(register_rx, unregister_rx, broadcast_rx));

    HubHandle {
        register_tx,
        unregister_tx,
        broadcast_tx,
        snapshot,
    }
}

/// A handle whose hub task is already gone
#[cfg(test)]
pub(crate) fn closed() -> HubHandle {
    let (register_tx, _) = mpsc::unbounded_channel();
    let (unregister_tx, _) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = mpsc::channel(1);
    HubHandle {
        register_tx,
        unregister_tx,
        broadcast_tx,
        snapshot: Arc::new(RwLock::new(HubSnapshot::default())),
    }
}

struct Hub {
    groups: HashMap<GroupId, HashMap<ConnectionId, Member>>,
    snapshot: Arc<RwLock<HubSnapshot>>,
}

impl Hub {
    async fn run(
        mut self,
        mut register_rx: mpsc::UnboundedReceiver<Member>,
        mut unregister_rx: mpsc::UnboundedReceiver<Client>,
        mut broadcast_rx: mpsc::Receiver<BroadcastMessage>,
    ) {
        tracing::info!("Hub started");
        loop {
            // Membership changes first, so a register sent before a broadcast
            // is always visible to that broadcast
            tokio::select! {
                biased;
                Some(member) = register_rx.recv() => self.register(member).await,
                Some(client) = unregister_rx.recv() => self.unregister(&client).await,
                Some(message) = broadcast_rx.recv() => self.broadcast(message).await,
                else => break,
            }
        }
        tracing::info!("Hub stopped");
    }

    async fn register(&mut self, member: Member) {
        let client = member.client.clone();
        let members = self.groups.entry(client.group_id.clone()).or_default();
        if members.insert(client.id.clone(), member).is_some() {
            tracing::warn!(connection_id = %client.id, "Connection registered twice, replacing");
        }
        tracing::info!(
            group_id = %client.group_id,
            connection_id = %client.id,
            user_id = %client.user_id,
            members = members.len(),
            "Client registered"
        );
        self.publish(&client.group_id).await;
    }

    async fn unregister(&mut self, client: &Client) {
        let Some(members) = self.groups.get_mut(&client.group_id) else {
            tracing::debug!(connection_id = %client.id, "Unregister for unknown group");
            return;
        };
        // Dropping the member closes its queue, which stops the write pump
        if members.remove(&client.id).is_none() {
            tracing::debug!(connection_id = %client.id, "Unregister for unknown connection");
            return;
        }
        tracing::info!(
            group_id = %client.group_id,
            connection_id = %client.id,
            user_id = %client.user_id,
            members = members.len(),
            "Client unregistered"
        );
        if members.is_empty() {
            self.groups.remove(&client.group_id);
        }
        self.publish(&client.group_id).await;
    }

    async fn broadcast(&mut self, message: BroadcastMessage) {
        let Some(members) = self.groups.get_mut(&message.group_id) else {
            tracing::debug!(group_id = %message.group_id, "Broadcast to group without members");
            return;
        };

        let frame: Frame = match message.message.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(group_id = %message.group_id, "Failed to encode broadcast: {}", e);
                return;
            }
        };

        let mut dropped = Vec::new();
        let mut delivered = 0usize;
        for (id, member) in members.iter() {
            if message.exclude.as_ref() == Some(id) {
                continue;
            }
            match member.queue.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        group_id = %message.group_id,
                        connection_id = %id,
                        user_id = %member.client.user_id,
                        error = %HubError::SlowConsumer,
                        "Evicting slow consumer"
                    );
                    dropped.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Queue already closed, removing");
                    dropped.push(id.clone());
                }
            }
        }

        tracing::debug!(
            group_id = %message.group_id,
            kind = message.message.kind(),
            delivered,
            dropped = dropped.len(),
            "Broadcast fanned out"
        );

        if dropped.is_empty() {
            return;
        }
        for id in &dropped {
            members.remove(id);
        }
        if members.is_empty() {
            self.groups.remove(&message.group_id);
        }
        self.publish(&message.group_id).await;
    }

    /// Refresh the snapshot entry of one group
    async fn publish(&self, group_id: &str) {
        let mut snapshot = self.snapshot.write().await;
        match self.groups.get(group_id) {
            Some(members) => {
                let infos = members
                    .values()
                    .map(|m| MemberInfo {
                        connection_id: m.client.id.clone(),
                        user_id: m.client.user_id.clone(),
                    })
                    .collect();
                snapshot.groups.insert(group_id.to_string(), infos);
            }
            None => {
                snapshot.groups.remove(group_id);
            }
        }
    }
}
