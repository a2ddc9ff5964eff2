//! Transaction keys, states, the pure state machines and the events surfaced to the TU.

pub mod event;
pub mod fsm;
pub mod key;
pub mod state;

pub use event::TransactionEvent;
pub(crate) use event::EventSink;
pub use fsm::{transition, Action, Input, Notification, Transition};
pub use key::TransactionKey;
pub use state::{TransactionKind, TransactionState};
