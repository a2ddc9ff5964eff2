//! Value types carried by SIP messages

pub mod method;
pub mod status;

pub use method::Method;
pub use status::StatusCode;
