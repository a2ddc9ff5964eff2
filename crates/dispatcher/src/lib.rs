//! Event dispatcher for the sigstack SIP stack
//!
//! The dispatcher owns a set of listening points and a set of consumer
//! channels. Once started it runs one reader task per listening point and
//! copies every inbound [`SipEvent`](sigstack_sip_transport::SipEvent) to
//! every channel, in registration order. It holds no protocol state.
//!
//! Slow consumers are never skipped: a send that blocks past the configured
//! deadline is reported and counted, then keeps waiting.

pub mod config;
pub mod dispatcher;
pub mod error;

pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherStats, EventDispatcher};
pub use error::{Error, Result};
