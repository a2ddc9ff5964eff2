//! Timer kinds and durations for server transactions.
//!
//! RFC 3261 Section 17.2 defines four timers on the server side:
//!
//! - **Timer G**: retransmission of a non-2xx final response to INVITE. Starts
//!   at T1 and doubles up to T2. Only used over unreliable transports.
//! - **Timer H**: how long an INVITE server transaction waits for the ACK,
//!   64*T1.
//! - **Timer I**: how long the Confirmed state absorbs ACK retransmissions,
//!   T4 over unreliable transports and zero over reliable ones.
//! - **Timer J**: how long a non-INVITE server transaction absorbs request
//!   retransmissions, 64*T1 over unreliable transports and zero over reliable
//!   ones.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A server transaction timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// Response retransmission interval (INVITE, Completed)
    G,
    /// Wait for ACK (INVITE, Completed)
    H,
    /// Wait for ACK retransmissions (INVITE, Confirmed)
    I,
    /// Wait for request retransmissions (non-INVITE, Completed)
    J,
}

impl TimerType {
    /// All server timers, in slot order
    pub const ALL: [TimerType; 4] = [TimerType::G, TimerType::H, TimerType::I, TimerType::J];

    pub(crate) fn slot(self) -> usize {
        match self {
            TimerType::G => 0,
            TimerType::H => 1,
            TimerType::I => 2,
            TimerType::J => 3,
        }
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerType::G => write!(f, "G"),
            TimerType::H => write!(f, "H"),
            TimerType::I => write!(f, "I"),
            TimerType::J => write!(f, "J"),
        }
    }
}

/// Timer durations, with RFC 3261 defaults
///
/// Loadable from configuration with every value in milliseconds:
///
/// ```toml
/// t1 = 500
/// t2 = 4000
/// t4 = 5000
/// wait_time_h = 32000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// **T1: RTT estimate (default 500 ms)**. Initial Timer G interval.
    #[serde(with = "duration_ms")]
    pub t1: Duration,

    /// **T2: maximum retransmission interval (default 4 s)**. Cap for Timer G.
    #[serde(with = "duration_ms")]
    pub t2: Duration,

    /// **T4: maximum time a message stays in the network (default 5 s)**
    #[serde(with = "duration_ms")]
    pub t4: Duration,

    /// **Timer H (default 32 s, 64*T1)**
    #[serde(with = "duration_ms")]
    pub wait_time_h: Duration,

    /// **Timer I over unreliable transports (default 5 s, T4)**
    #[serde(with = "duration_ms")]
    pub wait_time_i: Duration,

    /// **Timer J over unreliable transports (default 32 s, 64*T1)**
    #[serde(with = "duration_ms")]
    pub wait_time_j: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        let t1 = Duration::from_millis(500);
        let t4 = Duration::from_secs(5);
        Self {
            t1,
            t2: Duration::from_secs(4),
            t4,
            wait_time_h: t1 * 64,
            wait_time_i: t4,
            wait_time_j: t1 * 64,
        }
    }
}

impl TimerSettings {
    /// Initial duration of `timer` for a transaction on a transport of the
    /// given reliability. `None` means the timer is not armed at all.
    pub fn initial_duration(&self, timer: TimerType, reliable: bool) -> Option<Duration> {
        match timer {
            TimerType::G if reliable => None,
            TimerType::G => Some(self.t1),
            TimerType::H => Some(self.wait_time_h),
            TimerType::I if reliable => Some(Duration::ZERO),
            TimerType::I => Some(self.wait_time_i),
            TimerType::J if reliable => Some(Duration::ZERO),
            TimerType::J => Some(self.wait_time_j),
        }
    }

    /// Timer G interval after `current` has elapsed: doubled, capped at T2
    pub fn next_g_interval(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.t2)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
