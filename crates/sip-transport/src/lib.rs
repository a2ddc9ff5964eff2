//! Listening point contract for the sigstack SIP stack
//!
//! A listening point is one local transport endpoint. It yields inbound
//! [`SipEvent`]s and sends serialized messages to a host and port. Concrete
//! socket implementations live outside this crate; [`MemoryListeningPoint`]
//! is an in-process implementation used by tests and demos.

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::memory::{MemoryListeningPoint, SentMessage};
pub use transport::{ListeningPoint, SipEvent, Transaction, TransportType};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        Error, ListeningPoint, MemoryListeningPoint, Result, SipEvent, Transaction, TransportType,
    };
}
