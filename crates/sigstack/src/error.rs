use std::path::PathBuf;

use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or setting up logging
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has wrong field types
    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Unknown log level name
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    LoggingInit(String),
}

/// Errors that can occur running a [`SipServer`](crate::SipServer)
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dispatcher error
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] sigstack_dispatcher::Error),

    /// Transaction layer error
    #[error("Transaction error: {0}")]
    Transaction(#[from] sigstack_transaction_core::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] sigstack_sip_transport::Error),

    /// The server is already running or has already run
    #[error("Server already started")]
    AlreadyStarted,

    /// No listening point was registered before starting
    #[error("No listening points registered")]
    NoListeningPoints,
}
