//! Dispatcher configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default capacity of consumer channels created by the dispatcher
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default time a send may block before the consumer is reported as starved
pub const DEFAULT_SEND_DEADLINE_MS: u64 = 200;

/// Tuning for consumer channels and backpressure reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Capacity of channels handed out by [`EventDispatcher::subscribe`](crate::EventDispatcher::subscribe)
    pub channel_capacity: usize,
    /// Milliseconds a blocked send waits before a starvation warning
    pub send_deadline_ms: u64,
}

impl DispatcherConfig {
    /// Send deadline as a `Duration`
    pub fn send_deadline(&self) -> Duration {
        Duration::from_millis(self.send_deadline_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_deadline_ms: DEFAULT_SEND_DEADLINE_MS,
        }
    }
}
