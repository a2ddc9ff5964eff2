use thiserror::Error;

use crate::transaction::TransactionState;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// No live transaction for the given key
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// The request carries no branch token, so it cannot be matched
    #[error("Message has no Via branch")]
    MissingBranch,

    /// The input is not allowed in the transaction's current state
    #[error("Invalid transaction state transition: {input} in {state}")]
    InvalidStateTransition {
        /// State the transaction was in
        state: TransactionState,
        /// Input that was rejected
        input: String,
    },

    /// The response answers a different request than the transaction's
    #[error("Response {response} does not belong to transaction {key}")]
    ResponseMismatch {
        /// Key of the transaction the response was submitted to
        key: String,
        /// Summary of the rejected response
        response: String,
    },

    /// Server transactions are only created from requests
    #[error("Message is not a request: {0}")]
    NotARequest(String),

    /// The transaction has no listening point to send through
    #[error("No listening point assigned to transaction {0}")]
    NoListeningPoint(String),

    /// Error originating from the sip-transport crate
    #[error("SIP transport error: {0}")]
    Transport(#[from] sigstack_sip_transport::Error),

    /// Internal channel error (e.g., receiver dropped)
    #[error("Internal channel closed")]
    ChannelClosed,

    /// Other miscellaneous errors
    #[error("Other error: {0}")]
    Other(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
