//! Server transaction timers.
//!
//! - [`TimerType`]: the four server-side timers G, H, I and J.
//! - [`TimerSettings`]: their durations, with RFC 3261 defaults.
//!
//! Timers are armed and cancelled by the [`ServerTransaction`](crate::server::ServerTransaction)
//! that owns them; this module only describes them.

pub mod types;

pub use types::{TimerSettings, TimerType};
