use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building SIP message values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Status code outside the 100-699 range
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Status code text that is not a number
    #[error("Invalid status code text: {0}")]
    InvalidStatusText(String),

    /// Method text that is not a valid token
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}
