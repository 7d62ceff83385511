//! Per-connection action rate limiting.
//!
//! Protects a group from a single client flooding it with messages or typing
//! events. Over-limit actions are dropped and answered with `RATE_LIMITED`;
//! the connection itself stays open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::types::ConnectionId;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window counter keyed by connection id
#[derive(Debug, Clone)]
pub struct ActionLimiter {
    windows: Arc<Mutex<HashMap<ConnectionId, Window>>>,
    config: RateLimitConfig,
}

impl ActionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Count one action for `key`. Returns false when it must be rejected.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(window.started) >= self.config.window {
            window.count = 0;
            window.started = now;
        }
        if window.count >= self.config.max_actions {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop the state of a closed connection
    pub async fn forget(&self, key: &str) {
        self.windows.lock().await.remove(key);
    }
}
