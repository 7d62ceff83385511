//! Connection gate: decides whether an upgrade request may join a group.
//!
//! Checks run in a fixed order (token, group id shape, group existence,
//! membership) and the first failure is final. There are no retries; the
//! caller has to reconnect.

use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::error::{HubError, HubResult};
use crate::membership::MembershipStore;
use crate::types::{is_valid_group_id, GroupId, UserId};

/// A connection that passed every admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub user_id: UserId,
    pub group_id: GroupId,
}

#[derive(Clone)]
pub struct ConnectionGate {
    auth: Arc<dyn TokenValidator>,
    membership: Arc<dyn MembershipStore>,
}

impl ConnectionGate {
    pub fn new(auth: Arc<dyn TokenValidator>, membership: Arc<dyn MembershipStore>) -> Self {
        Self { auth, membership }
    }

    pub async fn admit(&self, token: Option<&str>, group_id: Option<&str>) -> HubResult<Admission> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(HubError::Unauthenticated)?;

        let user_id = self.auth.validate_token(token).await.map_err(|e| {
            tracing::warn!("Rejected connection token: {}", e);
            HubError::Unauthenticated
        })?;

        let group_id = match group_id.map(str::trim) {
            None | Some("") => {
                return Err(HubError::BadRequest("group_id is required".to_string()));
            }
            Some(g) if !is_valid_group_id(g) => {
                return Err(HubError::BadRequest(format!("invalid group_id: {:?}", g)));
            }
            Some(g) => g.to_string(),
        };

        if !self.membership.group_exists(&group_id).await {
            tracing::info!(%group_id, %user_id, "Connection to unknown group rejected");
            return Err(HubError::NotFound(group_id));
        }

        if !self.membership.is_member(&group_id, &user_id).await {
            tracing::warn!(%group_id, %user_id, "Non-member connection rejected");
            return Err(HubError::Forbidden(group_id));
        }

        Ok(Admission { user_id, group_id })
    }
}
