//! SIP message values for the sigstack transaction layer
//!
//! Parsing and serialization live outside this stack. What reaches the
//! transaction layer is a [`SipMessage`]: an immutable, validated value that
//! exposes its method or status, the branch token of its topmost Via header
//! and its serialized bytes.

pub mod error;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use message::{SipMessage, StartLine, BRANCH_MAGIC_COOKIE};
pub use types::{Method, StatusCode};

/// Re-export of common types
pub mod prelude {
    pub use crate::{Method, SipMessage, StartLine, StatusCode};
}
