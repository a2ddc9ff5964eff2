//! # Transaction Manager
//!
//! The [`TransactionManager`] owns every live server transaction, keyed by
//! [`TransactionKey`]: the branch token of the topmost Via header plus the
//! request method (ACK counts as INVITE). It is the consumer end of an
//! event dispatcher channel: each inbound [`SipEvent`] goes through
//! [`dispatch`](TransactionManager::dispatch), which either routes it to an
//! existing transaction, creates a new one, hands it to the transaction user
//! or drops it.
//!
//! ## Lifecycle
//!
//! ```text
//!   request, unknown key   ──► create (Proceeding) ──► NewRequest to TU
//!   CANCEL, live INVITE    ──► create (Proceeding) ──► CancelReceived to TU
//!   request, live key      ──► retransmission / ACK routing
//!   transaction terminates ──► removed, key tombstoned for 64*T1
//!   request, tombstoned    ──► dropped
//! ```
//!
//! Tombstones keep a late retransmission of a finished request from
//! creating a second transaction for the same key.
//!
//! ## Locking
//!
//! The transaction table is behind one `tokio::sync::Mutex` that is held
//! only while the table itself changes. A transaction's own lock may be held
//! while the table lock is taken (a transaction removing itself), never the
//! other way round.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sigstack_sip_core::StatusCode;
//! use sigstack_sip_core::SipMessage;
//! use sigstack_sip_transport::{ListeningPoint, MemoryListeningPoint};
//! use sigstack_transaction_core::{TimerSettings, TransactionEvent, TransactionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lp = MemoryListeningPoint::build("127.0.0.1", 5060)?;
//! let (manager, mut events) = TransactionManager::new(TimerSettings::default());
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(100);
//! lp.set_transport_channel(tx);
//! lp.start().await?;
//! manager.spawn_consumer(rx);
//!
//! while let Some(event) = events.recv().await {
//!     if let TransactionEvent::NewRequest { key, request, .. } = event {
//!         let ok = SipMessage::response_to(&request, StatusCode::Ok);
//!         manager.send_response(&key, ok).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod handlers;
mod types;

pub use types::{DispatchOutcome, DropReason};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn, Instrument, Span};

use sigstack_sip_core::SipMessage;
use sigstack_sip_transport::SipEvent;

use crate::error::{Error, Result};
use crate::server::{ServerTransaction, TransactionRegistry};
use crate::timer::TimerSettings;
use crate::transaction::{EventSink, TransactionEvent, TransactionKey, TransactionState};

/// Default capacity of transaction event channels
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

#[derive(Default)]
struct TransactionTable {
    transactions: HashMap<TransactionKey, Arc<ServerTransaction>>,
    tombstones: HashMap<TransactionKey, Instant>,
}

impl TransactionTable {
    fn is_tombstoned(&mut self, key: &TransactionKey, now: Instant) -> bool {
        match self.tombstones.get(key) {
            Some(expiry) if *expiry > now => true,
            Some(_) => {
                self.tombstones.remove(key);
                false
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &TransactionKey, ttl: Duration) -> Option<Arc<ServerTransaction>> {
        let removed = self.transactions.remove(key)?;
        let now = Instant::now();
        self.tombstones.retain(|_, expiry| *expiry > now);
        self.tombstones.insert(key.clone(), now + ttl);
        Some(removed)
    }
}

pub(crate) struct ManagerInner {
    table: Mutex<TransactionTable>,
    settings: TimerSettings,
    tombstone_ttl: Duration,
    events: EventSink,
    span: Span,
}

#[async_trait]
impl TransactionRegistry for ManagerInner {
    async fn remove_transaction(&self, key: &TransactionKey) {
        let removed = self.table.lock().await.remove(key, self.tombstone_ttl);
        if removed.is_some() {
            debug!(parent: &self.span, %key, "Removed terminated transaction");
        }
    }
}

/// Owns and routes server transactions
///
/// Cloning is cheap and every clone refers to the same set of transactions.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    /// Creates a manager and the receiver for its transaction events
    pub fn new(settings: TimerSettings) -> (Self, mpsc::Receiver<TransactionEvent>) {
        Self::with_config(settings, DEFAULT_EVENT_CAPACITY, info_span!("transaction_manager"))
    }

    /// Creates a manager with an explicit event channel capacity and logging span
    pub fn with_config(
        settings: TimerSettings,
        event_capacity: usize,
        span: Span,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let (events, rx) = EventSink::new(event_capacity);
        let manager = Self {
            inner: Arc::new(ManagerInner {
                table: Mutex::new(TransactionTable::default()),
                tombstone_ttl: settings.t1 * 64,
                settings,
                events,
                span,
            }),
        };
        (manager, rx)
    }

    /// Timer settings given to new transactions
    pub fn timer_settings(&self) -> &TimerSettings {
        &self.inner.settings
    }

    /// Routes one inbound event.
    ///
    /// Responses, stray ACKs and late requests for terminated transactions
    /// are dropped and reported through the returned [`DispatchOutcome`]. A
    /// request without a branch is an error.
    pub async fn dispatch(&self, event: SipEvent) -> Result<DispatchOutcome> {
        handlers::handle_event(self, event).await
    }

    /// Looks up the live transaction for `key`
    pub async fn lookup(&self, key: &TransactionKey) -> Option<Arc<ServerTransaction>> {
        self.inner.table.lock().await.transactions.get(key).cloned()
    }

    /// Removes the transaction for `key`, cancels its timers and marks it
    /// terminated before returning.
    ///
    /// Idempotent. Transactions that terminate on their own are removed
    /// through the registry hook, never through this method, so the caller
    /// never holds the transaction's lock here.
    pub async fn delete_transaction(&self, key: &TransactionKey) {
        let removed = self
            .inner
            .table
            .lock()
            .await
            .remove(key, self.inner.tombstone_ttl);

        match removed {
            Some(transaction) => {
                debug!(parent: &self.inner.span, %key, "Deleting transaction");
                transaction.terminate().await;
            }
            None => {
                trace!(parent: &self.inner.span, %key, "Delete of unknown transaction ignored");
            }
        }
    }

    /// Submits a TU response to the transaction for `key`
    pub async fn send_response(&self, key: &TransactionKey, response: SipMessage) -> Result<TransactionState> {
        let transaction = self
            .lookup(key)
            .await
            .ok_or_else(|| Error::TransactionNotFound(key.to_string()))?;
        transaction.respond(response).await
    }

    /// Current state of the transaction for `key`
    pub async fn transaction_state(&self, key: &TransactionKey) -> Option<TransactionState> {
        let transaction = self.lookup(key).await?;
        Some(transaction.state().await)
    }

    /// Number of live transactions
    pub async fn transaction_count(&self) -> usize {
        self.inner.table.lock().await.transactions.len()
    }

    /// Opens an additional receiver for transaction events
    ///
    /// Subscribers get a copy of every event on a best-effort basis; the
    /// receiver returned by the constructor is the one that is never skipped.
    pub fn subscribe(&self) -> mpsc::Receiver<TransactionEvent> {
        self.inner.events.subscribe()
    }

    /// Consumes a dispatcher channel until it closes
    pub async fn run(&self, mut rx: mpsc::Receiver<SipEvent>) {
        info!(parent: &self.inner.span, "Transaction manager consuming events");
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.dispatch(event).await {
                warn!(parent: &self.inner.span, "Dropping inbound event: {}", e);
            }
        }
        info!(parent: &self.inner.span, "Event channel closed, transaction manager consumer stopped");
    }

    /// Runs [`run`](Self::run) on its own task
    pub fn spawn_consumer(&self, rx: mpsc::Receiver<SipEvent>) -> JoinHandle<()> {
        let manager = self.clone();
        let span = self.inner.span.clone();
        tokio::spawn(async move { manager.run(rx).await }.instrument(span))
    }

    /// Terminates every live transaction
    pub async fn shutdown(&self) {
        let transactions: Vec<_> = {
            let mut table = self.inner.table.lock().await;
            let ttl = self.inner.tombstone_ttl;
            let keys: Vec<TransactionKey> = table.transactions.keys().cloned().collect();
            keys.iter()
                .filter_map(|key| table.remove(key, ttl))
                .collect()
        };

        let count = transactions.len();
        join_all(transactions.iter().map(|transaction| transaction.terminate())).await;
        info!(parent: &self.inner.span, terminated = count, "Transaction manager shut down");
    }
}
