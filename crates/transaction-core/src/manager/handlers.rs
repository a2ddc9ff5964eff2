use std::collections::hash_map::Entry;
use std::sync::{Arc, Weak};

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use sigstack_sip_core::Method;
use sigstack_sip_transport::{SipEvent, Transaction};

use crate::error::{Error, Result};
use crate::server::{ServerTransaction, TransactionRegistry};
use crate::transaction::{Input, TransactionEvent, TransactionKey};

use super::types::{DispatchOutcome, DropReason};
use super::{ManagerInner, TransactionManager};

/// Routes one inbound event to a transaction, the TU, or nowhere
pub(super) async fn handle_event(manager: &TransactionManager, event: SipEvent) -> Result<DispatchOutcome> {
    let inner = &manager.inner;

    let Some(method) = event.message().method().cloned() else {
        debug!(parent: &inner.span, "Dropping response {}", event.message());
        return Ok(DispatchOutcome::Dropped(DropReason::Response));
    };
    let key = TransactionKey::from_request(event.message()).ok_or(Error::MissingBranch)?;

    if let Some(transaction) = manager.lookup(&key).await {
        return Ok(route_to_existing(inner, transaction, &method, event).await);
    }

    if method == Method::Ack {
        debug!(parent: &inner.span, %key, "ACK matches no transaction");
        inner
            .events
            .deliver(TransactionEvent::StrayAck {
                source: event.source(),
                ack: event.into_message(),
            })
            .await;
        return Ok(DispatchOutcome::Dropped(DropReason::StrayAck));
    }

    create_transaction(inner, key, method, event).await
}

async fn route_to_existing(
    inner: &Arc<ManagerInner>,
    transaction: Arc<ServerTransaction>,
    method: &Method,
    event: SipEvent,
) -> DispatchOutcome {
    let key = transaction.key();

    let input = if *method == Method::Ack {
        Input::Ack
    } else {
        Input::Retransmission
    };
    let state = transaction.process_message(event.into_message(), input).await;
    trace!(parent: &inner.span, %key, %state, %method, "Request routed to existing transaction");
    DispatchOutcome::Routed
}

async fn create_transaction(
    inner: &Arc<ManagerInner>,
    key: TransactionKey,
    method: Method,
    event: SipEvent,
) -> Result<DispatchOutcome> {
    let weak: Weak<ManagerInner> = Arc::downgrade(inner);
    let registry: Weak<dyn TransactionRegistry> = weak;
    let candidate = ServerTransaction::new(
        event.message().clone(),
        event.source(),
        event.listening_point().cloned(),
        inner.settings,
        inner.events.clone(),
        registry,
        &inner.span,
    )?;

    // Tombstone check, insert and CANCEL target lookup under one lock so a
    // concurrent delete or a concurrent creation for the same key is seen
    let (winner, cancelled_invite) = {
        let mut table = inner.table.lock().await;
        if table.is_tombstoned(&key, Instant::now()) {
            trace!(parent: &inner.span, %key, "Late request for terminated transaction dropped");
            return Ok(DispatchOutcome::Dropped(DropReason::Tombstoned));
        }
        let cancelled_invite = if method == Method::Cancel {
            let invite = TransactionKey::new(key.branch(), Method::Invite);
            table.transactions.contains_key(&invite).then_some(invite)
        } else {
            None
        };
        let winner = match table.transactions.entry(key.clone()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(candidate.clone());
                Ok(candidate)
            }
        };
        (winner, cancelled_invite)
    };

    let transaction = match winner {
        Ok(transaction) => transaction,
        Err(existing) => {
            debug!(parent: &inner.span, %key, "Transaction created concurrently, routing as retransmission");
            return Ok(route_to_existing(inner, existing, &method, event).await);
        }
    };

    if transaction.listening_point().await.is_none() {
        warn!(parent: &inner.span, %key, "Transaction has no listening point, responses cannot be sent");
    }
    debug!(parent: &inner.span, %key, kind = %transaction.kind(), "New server transaction");

    let delivered = match cancelled_invite {
        Some(invite) => {
            debug!(parent: &inner.span, %key, %invite, "CANCEL for pending INVITE passed to TU");
            TransactionEvent::CancelReceived {
                key,
                invite,
                cancel: event.message().clone(),
                source: event.source(),
                transaction,
            }
        }
        None => TransactionEvent::NewRequest {
            key,
            request: event.message().clone(),
            source: event.source(),
            transaction,
        },
    };
    inner.events.deliver(delivered).await;
    Ok(DispatchOutcome::Created)
}
