//! # SIP server transactions
//!
//! Server transaction layer of the sigstack SIP stack (RFC 3261 Section 17.2).
//!
//! The crate is built from three layers:
//!
//! - [`transaction`]: states, inputs and the pure state machines for INVITE
//!   and non-INVITE server transactions, plus the events delivered to the
//!   transaction user (TU).
//! - [`server`]: [`ServerTransaction`], which runs a state machine against a
//!   listening point and the timers in [`timer`].
//! - [`manager`]: [`TransactionManager`], which consumes events from a
//!   dispatcher channel, matches them to transactions by Via branch and method and owns
//!   the transaction table.
//!
//! ```text
//!  ListeningPoint ─► EventDispatcher ─► TransactionManager ─► ServerTransaction
//!                                             │                     │
//!                                             └── TransactionEvent ─┴─► TU
//! ```
//!
//! The TU answers requests with
//! [`TransactionManager::send_response`]; retransmissions, ACK absorption
//! and timer handling stay inside the transaction.

mod error;
pub mod manager;
pub mod server;
pub mod timer;
pub mod transaction;

pub use error::{Error, Result};
pub use manager::{DispatchOutcome, DropReason, TransactionManager, DEFAULT_EVENT_CAPACITY};
pub use server::{ServerTransaction, TransactionRegistry, HISTORY_LIMIT};
pub use timer::{TimerSettings, TimerType};
pub use transaction::{
    transition, Action, Input, Notification, TransactionEvent, TransactionKey, TransactionKind,
    TransactionState, Transition,
};

/// Common imports for transaction-layer users
pub mod prelude {
    pub use crate::{
        DispatchOutcome, Error, Result, ServerTransaction, TimerSettings, TransactionEvent,
        TransactionKey, TransactionKind, TransactionManager, TransactionState,
    };
}
