use std::sync::Arc;

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::HubConfig;
use crate::gate::ConnectionGate;
use crate::hub::{self, HubHandle};
use crate::membership::MembershipStore;
use crate::pipeline::MessagePipeline;
use crate::ratelimit::ActionLimiter;
use crate::store::MessageStore;

/// External services the hub depends on
#[derive(Clone)]
pub struct Collaborators {
    pub tokens: Arc<dyn TokenValidator>,
    pub membership: Arc<dyn MembershipStore>,
    pub messages: Arc<dyn MessageStore>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: HubConfig,
    pub auth: AuthConfig,
    pub hub: HubHandle,
    pub gate: ConnectionGate,
    pub pipeline: MessagePipeline,
    /// Per-connection action limiter (None = disabled)
    pub limiter: Option<ActionLimiter>,
}

impl AppState {
    /// Build the state and start the hub task. Must be called inside a Tokio runtime.
    pub fn new(config: HubConfig, auth: AuthConfig, collaborators: Collaborators) -> Self {
        let hub = hub::spawn(config.broadcast_capacity);
        let gate = ConnectionGate::new(collaborators.tokens, collaborators.membership);
        let pipeline =
            MessagePipeline::new(collaborators.messages, hub.clone(), config.max_content_chars);
        let limiter = config.rate_limit.map(ActionLimiter::new);

        Self {
            config,
            auth,
            hub,
            gate,
            pipeline,
            limiter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtAuth;
    use crate::membership::InMemoryMembership;
    use crate::store::InMemoryMessageStore;

    fn collaborators() -> Collaborators {
        Collaborators {
            tokens: Arc::new(JwtAuth::new("secret")),
            membership: Arc::new(InMemoryMembership::default()),
            messages: Arc::new(InMemoryMessageStore::new()),
        }
    }

    fn auth() -> AuthConfig {
        AuthConfig {
            token_secret: "secret".to_string(),
            admin_token: None,
        }
    }

    #[tokio::test]
    async fn test_new_state_starts_empty_hub() {
        let state = AppState::new(HubConfig::default(), auth(), collaborators());
        let snapshot = state.hub.snapshot().await;
        assert_eq!(snapshot.group_count(), 0);
        assert!(state.limiter.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_disabled() {
        let config = HubConfig {
            rate_limit: None,
            ..HubConfig::default()
        };
        let state = AppState::new(config, auth(), collaborators());
        assert!(state.limiter.is_none());
    }
}
