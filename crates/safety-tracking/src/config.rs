//! Engine configuration
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SAFETY_ACK_TIMEOUT_SECS` | 30 |
//! | `SAFETY_REFRESH_INTERVAL_SECS` | 300 |
//! | `SAFETY_REFRESH_TIMEOUT_SECS` | 10 |
//! | `SAFETY_EVENT_CAPACITY` | 1024 |
//! | `SAFETY_COMMAND_CAPACITY` | 64 |
//! | `SAFETY_ESCALATION_CAPACITY` | 256 |
//! | `SAFETY_IDLE_TIMEOUT_SECS` | 3600 |

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long an SOS may stay open before `Unacknowledged` is emitted
    pub ack_timeout: Duration,
    pub refresh_interval: Duration,
    /// Upper bound on a single zone-source fetch
    pub refresh_timeout: Duration,
    /// Broadcast buffer; slow subscribers lag past this
    pub event_capacity: usize,
    /// Per-subject command queue depth
    pub command_capacity: usize,
    /// Depth of the lossless alert lifecycle queue feeding the dispatcher
    pub escalation_capacity: usize,
    /// Sessions silent for this long are closed unless an SOS is open
    pub idle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(300),
            refresh_timeout: Duration::from_secs(10),
            event_capacity: 1024,
            command_capacity: 64,
            escalation_capacity: 256,
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ack_timeout: env_secs("SAFETY_ACK_TIMEOUT_SECS", defaults.ack_timeout),
            refresh_interval: env_secs("SAFETY_REFRESH_INTERVAL_SECS", defaults.refresh_interval),
            refresh_timeout: env_secs("SAFETY_REFRESH_TIMEOUT_SECS", defaults.refresh_timeout),
            event_capacity: env_usize("SAFETY_EVENT_CAPACITY", defaults.event_capacity),
            command_capacity: env_usize("SAFETY_COMMAND_CAPACITY", defaults.command_capacity),
            escalation_capacity: env_usize(
                "SAFETY_ESCALATION_CAPACITY",
                defaults.escalation_capacity,
            ),
            idle_timeout: env_secs("SAFETY_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    pub fn with_escalation_capacity(mut self, capacity: usize) -> Self {
        self.escalation_capacity = capacity.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(key, value = %raw, "Ignoring invalid duration, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!(key, value = %raw, "Ignoring invalid capacity, using default");
                default
            }
        },
        Err(_) => default,
    }
}
