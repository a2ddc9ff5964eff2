//! # sigstack
//!
//! A SIP server-transaction stack. This crate wires the pieces together:
//!
//! - [`StackConfig`]: timer, dispatcher and logging configuration, loadable
//!   from TOML.
//! - [`setup_logging`]: installs a `tracing-subscriber` with `EnvFilter`.
//! - [`SipServer`]: listening points feeding an event dispatcher whose
//!   first channel is consumed by the transaction manager.
//!
//! The building blocks are re-exported as modules for direct use.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use config::StackConfig;
pub use error::{ConfigError, Error, Result};
pub use logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
pub use server::SipServer;

pub use sigstack_dispatcher as dispatcher;
pub use sigstack_sip_core as sip_core;
pub use sigstack_sip_transport as sip_transport;
pub use sigstack_transaction_core as transaction;

/// Common imports for applications
pub mod prelude {
    pub use crate::{SipServer, StackConfig};
    pub use sigstack_sip_core::{Method, SipMessage, StatusCode};
    pub use sigstack_sip_transport::{ListeningPoint, MemoryListeningPoint, TransportType};
    pub use sigstack_transaction_core::{
        TransactionEvent, TransactionKey, TransactionManager, TransactionState,
    };
}
