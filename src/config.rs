//! Runtime configuration for the messaging hub, loaded from the environment

use std::net::SocketAddr;
use std::time::Duration;

/// Upper bound for every connection timer; larger values overflow `Instant` math
pub const MAX_TIMER: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables for connections, queues and the action rate limiter
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: SocketAddr,
    /// Capacity of each connection's outbound queue
    pub queue_capacity: usize,
    /// Capacity of the hub's broadcast input channel
    pub broadcast_capacity: usize,
    /// Largest inbound WebSocket message accepted
    pub max_message_bytes: usize,
    /// Idle-read deadline, refreshed on every pong
    pub pong_wait: Duration,
    /// Keepalive ping interval (always shorter than `pong_wait`)
    pub ping_period: Duration,
    /// Budget for a single flush to the socket
    pub write_wait: Duration,
    pub max_content_chars: usize,
    /// Per-connection action limit (None = disabled)
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub max_actions: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 30,
            window: Duration::from_secs(10),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            queue_capacity: 256,
            broadcast_capacity: 1024,
            max_message_bytes: 64 * 1024,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
            max_content_chars: 4000,
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

impl HubConfig {
    /// Load config from CHAT_* environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = env_parse("CHAT_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let queue_capacity = env_parse::<usize>("CHAT_QUEUE_CAPACITY")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.queue_capacity);
        let broadcast_capacity = env_parse::<usize>("CHAT_BROADCAST_CAPACITY")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.broadcast_capacity);
        let max_message_bytes = env_parse::<usize>("CHAT_MAX_MESSAGE_BYTES")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_message_bytes);
        let pong_wait = env_parse("CHAT_PONG_WAIT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.pong_wait);
        let ping_period = env_parse("CHAT_PING_PERIOD_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.ping_period);
        let write_wait = env_parse("CHAT_WRITE_WAIT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.write_wait);
        let max_content_chars =
            env_parse("CHAT_MAX_CONTENT_CHARS").unwrap_or(defaults.max_content_chars);

        let rate_limit = if env_flag("CHAT_RATE_LIMIT", true) {
            let base = RateLimitConfig::default();
            Some(RateLimitConfig {
                max_actions: env_parse("CHAT_RATE_LIMIT_MAX").unwrap_or(base.max_actions),
                window: env_parse("CHAT_RATE_LIMIT_WINDOW_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(base.window),
            })
        } else {
            None
        };

        let config = Self {
            bind_addr,
            queue_capacity,
            broadcast_capacity,
            max_message_bytes,
            pong_wait,
            ping_period,
            write_wait,
            max_content_chars,
            rate_limit,
        }
        .normalized();

        tracing::info!(
            %config.bind_addr,
            config.queue_capacity,
            config.max_message_bytes,
            pong_wait_secs = config.pong_wait.as_secs(),
            ping_period_secs = config.ping_period.as_secs(),
            rate_limit_enabled = config.rate_limit.is_some(),
            "Hub config loaded"
        );

        config
    }

    /// Keep the ping period strictly below the pong wait, otherwise idle
    /// connections would time out before they are ever pinged. All timers are
    /// capped at [`MAX_TIMER`].
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.pong_wait.is_zero() {
            self.pong_wait = defaults.pong_wait;
        }
        if self.write_wait.is_zero() {
            self.write_wait = defaults.write_wait;
        }
        for (name, timer) in [
            ("pong_wait", &mut self.pong_wait),
            ("ping_period", &mut self.ping_period),
            ("write_wait", &mut self.write_wait),
        ] {
            if *timer > MAX_TIMER {
                tracing::warn!(timer = name, max_secs = MAX_TIMER.as_secs(), "Timer too large, capping");
                *timer = MAX_TIMER;
            }
        }
        if self.ping_period.is_zero() || self.ping_period >= self.pong_wait {
            let clamped = self.pong_wait * 9 / 10;
            tracing::warn!(
                ping_period_ms = self.ping_period.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "Ping period must be shorter than pong wait, clamping"
            );
            self.ping_period = clamped;
        }
        self
    }
}
