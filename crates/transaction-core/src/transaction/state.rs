use std::fmt;

use sigstack_sip_core::Method;

/// State of a server transaction (RFC 3261 Section 17.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Before the originating request has been applied
    Initial,
    /// Request received, no final response sent yet
    Proceeding,
    /// Final response sent, absorbing retransmissions (and waiting for the ACK on INVITE)
    Completed,
    /// **INVITE only.** ACK received, absorbing ACK retransmissions
    Confirmed,
    /// Finished; the transaction is removed from the manager
    Terminated,
}

impl TransactionState {
    /// Checks if the transaction state is `Terminated`.
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Initial => "Initial",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Confirmed => "Confirmed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Which server state machine a transaction follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// INVITE server transaction (RFC 3261 Section 17.2.1)
    InviteServer,
    /// Non-INVITE server transaction (RFC 3261 Section 17.2.2)
    NonInviteServer,
}

impl TransactionKind {
    /// Picks the state machine for a request method
    pub fn for_method(method: &Method) -> Self {
        match method {
            Method::Invite => TransactionKind::InviteServer,
            _ => TransactionKind::NonInviteServer,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::InviteServer => write!(f, "InviteServer"),
            TransactionKind::NonInviteServer => write!(f, "NonInviteServer"),
        }
    }
}
