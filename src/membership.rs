//! Group membership lookups used by the connection gate

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::types::{GroupId, UserId};

/// Source of truth for which groups exist and who belongs to them
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn group_exists(&self, group_id: &str) -> bool;
    async fn is_member(&self, group_id: &str, user_id: &str) -> bool;
}

/// In-process membership table for development and tests
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    groups: RwLock<HashMap<GroupId, HashSet<UserId>>>,
}

impl InMemoryMembership {
    /// Build from a seed string like `g1=alice,bob;g2=carol`
    pub fn from_seed(seed: &str) -> Self {
        Self {
            groups: RwLock::new(parse_seed(seed)),
        }
    }

    /// Load the seed from CHAT_GROUPS (empty table when unset)
    pub fn from_env() -> Self {
        let seed = std::env::var("CHAT_GROUPS").unwrap_or_default();
        let groups = parse_seed(&seed);
        tracing::info!(groups = groups.len(), "Membership seed loaded");
        Self {
            groups: RwLock::new(groups),
        }
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembership {
    async fn group_exists(&self, group_id: &str) -> bool {
        self.groups.read().await.contains_key(group_id)
    }

    async fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        self.groups
            .read()
            .await
            .get(group_id)
            .is_some_and(|members| members.contains(user_id))
    }
}

fn parse_seed(seed: &str) -> HashMap<GroupId, HashSet<UserId>> {
    let mut groups: HashMap<GroupId, HashSet<UserId>> = HashMap::new();

    for entry in seed.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (group, users) = entry.split_once('=').unwrap_or((entry, ""));
        let group = group.trim();
        if group.is_empty() {
            tracing::warn!(entry, "Skipping membership seed entry without group id");
            continue;
        }
        let members = groups.entry(group.to_string()).or_default();
        members.extend(
            users
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
        );
    }

    groups
}
