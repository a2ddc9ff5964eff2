use std::fmt;

/// What [`TransactionManager::dispatch`](super::TransactionManager::dispatch) did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new server transaction was created
    Created,
    /// The message was handed to an existing transaction or to the TU
    Routed,
    /// The message was discarded
    Dropped(DropReason),
}

/// Why a message was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Responses have no business in a server transaction layer
    Response,
    /// ACK matching no live transaction
    StrayAck,
    /// Late request for a recently terminated transaction
    Tombstoned,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Response => write!(f, "response"),
            DropReason::StrayAck => write!(f, "stray ACK"),
            DropReason::Tombstoned => write!(f, "terminated transaction"),
        }
    }
}
