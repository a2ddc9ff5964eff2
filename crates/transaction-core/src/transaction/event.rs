use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use sigstack_sip_core::SipMessage;

use crate::server::ServerTransaction;
use crate::transaction::TransactionKey;

/// Events delivered to the transaction user
#[derive(Clone)]
pub enum TransactionEvent {
    /// A new server transaction was created for an inbound request
    NewRequest {
        /// Key of the new transaction
        key: TransactionKey,
        /// The request
        request: SipMessage,
        /// Where it came from
        source: SocketAddr,
        /// Handle for responding
        transaction: Arc<ServerTransaction>,
    },

    /// ACK received for a non-2xx final response to INVITE
    AckReceived {
        /// Key of the INVITE transaction
        key: TransactionKey,
        /// The ACK
        ack: SipMessage,
    },

    /// CANCEL received for a live INVITE transaction.
    ///
    /// The CANCEL has a server transaction of its own, which the TU answers
    /// (normally with 200) before answering the INVITE (normally with 487).
    CancelReceived {
        /// Key of the CANCEL transaction
        key: TransactionKey,
        /// Key of the INVITE transaction being cancelled
        invite: TransactionKey,
        /// The CANCEL request
        cancel: SipMessage,
        /// Where it came from
        source: SocketAddr,
        /// Handle for responding to the CANCEL
        transaction: Arc<ServerTransaction>,
    },

    /// ACK that matches no live transaction (typically the ACK for a 2xx)
    StrayAck {
        /// The ACK
        ack: SipMessage,
        /// Where it came from
        source: SocketAddr,
    },

    /// Timer H expired without an ACK
    Timeout {
        /// Transaction key
        key: TransactionKey,
    },

    /// Sending a response failed; the transaction has been terminated
    TransportError {
        /// Transaction key
        key: TransactionKey,
        /// Description of the failure
        error: String,
    },

    /// The transaction reached `Terminated` and was removed
    Terminated {
        /// Transaction key
        key: TransactionKey,
    },
}

impl TransactionEvent {
    /// Key of the transaction this event is about, if any
    pub fn key(&self) -> Option<&TransactionKey> {
        match self {
            TransactionEvent::NewRequest { key, .. }
            | TransactionEvent::AckReceived { key, .. }
            | TransactionEvent::CancelReceived { key, .. }
            | TransactionEvent::Timeout { key }
            | TransactionEvent::TransportError { key, .. }
            | TransactionEvent::Terminated { key } => Some(key),
            TransactionEvent::StrayAck { .. } => None,
        }
    }

    /// Branch of the message this event is about
    pub fn branch(&self) -> Option<&str> {
        match self {
            TransactionEvent::StrayAck { ack, .. } => ack.branch(),
            other => other.key().map(TransactionKey::branch),
        }
    }
}

impl fmt::Debug for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionEvent::NewRequest { key, request, source, .. } => f
                .debug_struct("NewRequest")
                .field("key", &key.to_string())
                .field("request", &request.to_string())
                .field("source", source)
                .finish(),
            TransactionEvent::AckReceived { key, .. } => {
                f.debug_struct("AckReceived").field("key", &key.to_string()).finish()
            }
            TransactionEvent::CancelReceived { key, invite, source, .. } => f
                .debug_struct("CancelReceived")
                .field("key", &key.to_string())
                .field("invite", &invite.to_string())
                .field("source", source)
                .finish(),
            TransactionEvent::StrayAck { ack, source } => f
                .debug_struct("StrayAck")
                .field("ack", &ack.to_string())
                .field("source", source)
                .finish(),
            TransactionEvent::Timeout { key } => {
                f.debug_struct("Timeout").field("key", &key.to_string()).finish()
            }
            TransactionEvent::TransportError { key, error } => f
                .debug_struct("TransportError")
                .field("key", &key.to_string())
                .field("error", error)
                .finish(),
            TransactionEvent::Terminated { key } => {
                f.debug_struct("Terminated").field("key", &key.to_string()).finish()
            }
        }
    }
}

/// Fan-out of transaction events to the primary receiver and any subscribers
#[derive(Clone)]
pub(crate) struct EventSink {
    primary: mpsc::Sender<TransactionEvent>,
    subscribers: Arc<RwLock<Vec<mpsc::Sender<TransactionEvent>>>>,
    capacity: usize,
}

impl EventSink {
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let capacity = capacity.max(1);
        let (primary, rx) = mpsc::channel(capacity);
        let sink = Self {
            primary,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            capacity,
        };
        (sink, rx)
    }

    pub(crate) fn subscribe(&self) -> mpsc::Receiver<TransactionEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().push(tx);
        rx
    }

    /// Waits for room on the primary channel; subscribers get a best-effort copy.
    pub(crate) async fn deliver(&self, event: TransactionEvent) {
        self.copy_to_subscribers(&event);
        if self.primary.send(event).await.is_err() {
            trace!("Primary transaction event receiver dropped");
        }
    }

    /// Never waits. Used while a transaction lock is held.
    pub(crate) fn emit(&self, event: TransactionEvent) {
        self.copy_to_subscribers(&event);
        match self.primary.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(branch = ?event.branch(), "Transaction event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Primary transaction event receiver dropped");
            }
        }
    }

    fn copy_to_subscribers(&self, event: &TransactionEvent) {
        let subscribers = self.subscribers.read().clone();
        if subscribers.is_empty() {
            return;
        }
        let mut closed = false;
        for tx in &subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(branch = ?event.branch(), "Subscriber channel full, event not copied");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed = true,
            }
        }
        if closed {
            self.subscribers.write().retain(|tx| !tx.is_closed());
        }
    }
}
