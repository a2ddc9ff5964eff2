use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the event dispatcher
#[derive(Error, Debug)]
pub enum Error {
    /// `start` was called before any listening point was added
    #[error("No listening points registered")]
    NoListeningPoints,

    /// A listening point failed to start
    #[error("Transport error: {0}")]
    Transport(#[from] sigstack_sip_transport::Error),
}
