use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by listening points
#[derive(Error, Debug)]
pub enum Error {
    /// The listening point has been closed
    #[error("Transport closed")]
    TransportClosed,

    /// Bytes could not be delivered to the destination
    #[error("Failed to send to {host}:{port}: {reason}")]
    SendFailed {
        /// Destination host
        host: String,
        /// Destination port
        port: u16,
        /// What went wrong
        reason: String,
    },

    /// Host or port cannot be used as an address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The channel towards the consumer has been dropped
    #[error("Transport channel closed")]
    ChannelClosed,

    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
