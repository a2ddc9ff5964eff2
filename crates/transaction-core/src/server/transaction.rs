use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, trace, warn, Instrument, Span};

use sigstack_sip_core::{Method, SipMessage};
use sigstack_sip_transport::{ListeningPoint, Transaction};

use crate::error::{Error, Result};
use crate::server::TransactionRegistry;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{
    transition, Action, EventSink, Input, Notification, TransactionEvent, TransactionKey,
    TransactionKind, TransactionState,
};

/// Number of messages kept in a transaction's history
pub const HISTORY_LIMIT: usize = 16;

#[derive(Default)]
struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    // Bumping the generation turns a firing that already left the sleep into a no-op
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

struct Inner {
    state: TransactionState,
    last_response: Option<SipMessage>,
    last_message: Option<SipMessage>,
    history: VecDeque<SipMessage>,
    listening_point: Option<Arc<dyn ListeningPoint>>,
    host: String,
    port: u16,
    timers: [TimerSlot; 4],
    g_interval: Duration,
    last_error: Option<String>,
    deleted: bool,
}

impl Inner {
    fn record(&mut self, message: SipMessage) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    fn cancel_timers(&mut self) {
        for slot in self.timers.iter_mut() {
            slot.cancel();
        }
    }

    fn is_reliable(&self) -> bool {
        self.listening_point
            .as_ref()
            .map(|lp| lp.transport_type().is_reliable())
            .unwrap_or(false)
    }
}

/// A server transaction (RFC 3261 Section 17.2)
///
/// Created by the [`TransactionManager`](crate::manager::TransactionManager)
/// when a request with an unknown key arrives, already in `Proceeding`.
/// Every input goes through [`transition`] under the transaction's own lock;
/// the returned actions are then executed in order: responses are sent
/// through the assigned listening point, timers are spawned as tasks, and
/// the transaction user is notified through [`TransactionEvent`]s.
///
/// Inputs produced while actions run (a zero-duration timer, a failed send)
/// are applied in the same locked section, after the current transition.
pub struct ServerTransaction {
    key: TransactionKey,
    kind: TransactionKind,
    origin: SipMessage,
    settings: TimerSettings,
    events: EventSink,
    registry: Weak<dyn TransactionRegistry>,
    span: Span,
    weak_self: Weak<ServerTransaction>,
    inner: Mutex<Inner>,
}

impl ServerTransaction {
    pub(crate) fn new(
        request: SipMessage,
        source: SocketAddr,
        listening_point: Option<Arc<dyn ListeningPoint>>,
        settings: TimerSettings,
        events: EventSink,
        registry: Weak<dyn TransactionRegistry>,
        parent: &Span,
    ) -> Result<Arc<Self>> {
        let method = request
            .method()
            .cloned()
            .ok_or_else(|| Error::NotARequest(request.to_string()))?;
        if method == Method::Ack {
            return Err(Error::Other(format!(
                "ACK does not create a server transaction: {request}"
            )));
        }
        let key = TransactionKey::from_request(&request).ok_or(Error::MissingBranch)?;
        let kind = TransactionKind::for_method(&method);
        let state = transition(kind, TransactionState::Initial, &Input::Request)?.next;

        let span = info_span!(parent: parent, "server_transaction", key = %key, kind = %kind);
        debug!(key = %key, kind = %kind, %source, "Created server transaction for {}", request);

        let mut history = VecDeque::with_capacity(HISTORY_LIMIT);
        history.push_back(request.clone());

        Ok(Arc::new_cyclic(|weak_self| Self {
            key,
            kind,
            settings,
            events,
            registry,
            span,
            weak_self: weak_self.clone(),
            inner: Mutex::new(Inner {
                state,
                last_response: None,
                last_message: Some(request.clone()),
                history,
                listening_point,
                host: source.ip().to_string(),
                port: source.port(),
                timers: Default::default(),
                g_interval: settings.t1,
                last_error: None,
                deleted: false,
            }),
            origin: request,
        }))
    }

    /// Branch and method identifying this transaction
    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    /// Branch token of the originating request
    pub fn branch(&self) -> &str {
        self.key.branch()
    }

    /// INVITE or non-INVITE
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Current state
    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    /// The last response submitted by the TU
    pub async fn last_response(&self) -> Option<SipMessage> {
        self.inner.lock().await.last_response.clone()
    }

    /// Recent messages in and out, oldest first, at most [`HISTORY_LIMIT`]
    pub async fn history(&self) -> Vec<SipMessage> {
        self.inner.lock().await.history.iter().cloned().collect()
    }

    /// Host and port responses are sent to
    pub async fn destination(&self) -> (String, u16) {
        let inner = self.inner.lock().await;
        (inner.host.clone(), inner.port)
    }

    /// Submits a response from the TU.
    ///
    /// A 1xx keeps the transaction in `Proceeding`; a final response moves it
    /// on as RFC 3261 prescribes. A response that the current state does not
    /// accept, or one whose CSeq method is not the transaction's, is
    /// rejected and changes nothing. If the send fails the
    /// transaction is torn down and the transport error is returned.
    pub async fn respond(&self, response: SipMessage) -> Result<TransactionState> {
        let status = response
            .status()
            .ok_or_else(|| Error::Other(format!("not a response: {response}")))?;
        if response.cseq_method() != Some(self.key.method()) {
            return Err(Error::ResponseMismatch {
                key: self.key.to_string(),
                response: response.to_string(),
            });
        }
        let input = Input::for_status(status);

        let mut inner = self.inner.lock().await;
        if inner.deleted {
            return Err(Error::InvalidStateTransition {
                state: TransactionState::Terminated,
                input: input.to_string(),
            });
        }
        transition(self.kind, inner.state, &input)?;

        trace!(key = %self.key, state = %inner.state, "TU submitted {}", response);
        inner.last_response = Some(response.clone());
        inner.last_message = Some(response);

        match self.apply(&mut inner, input).await {
            Some(e) => Err(e),
            None => Ok(inner.state),
        }
    }

    /// Feeds an inbound request matched to this transaction
    pub(crate) async fn process_message(&self, message: SipMessage, input: Input) -> TransactionState {
        let mut inner = self.inner.lock().await;
        if inner.deleted {
            trace!(key = %self.key, "Transaction deleted, ignoring {}", message);
            return TransactionState::Terminated;
        }
        trace!(key = %self.key, state = %inner.state, "Received {}", message);
        inner.last_message = Some(message.clone());
        inner.record(message);
        self.apply(&mut inner, input).await;
        inner.state
    }

    /// Tears the transaction down without telling the registry.
    ///
    /// Used by the manager after it has already removed the transaction.
    /// Returns false if the transaction was already gone.
    pub(crate) async fn terminate(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.deleted {
            return false;
        }
        inner.deleted = true;
        inner.cancel_timers();
        let from = inner.state;
        inner.state = TransactionState::Terminated;
        debug!(key = %self.key, "Transaction terminated from {}", from);
        self.events.emit(TransactionEvent::Terminated {
            key: self.key.clone(),
        });
        true
    }

    /// Applies `input` and every input it produces. Returns the first send failure.
    async fn apply(&self, inner: &mut Inner, input: Input) -> Option<Error> {
        let mut pending = VecDeque::from([input]);
        let mut failure = None;

        while let Some(input) = pending.pop_front() {
            if inner.deleted {
                trace!(key = %self.key, "Transaction deleted, dropping {}", input);
                break;
            }

            let from = inner.state;
            let step = match transition(self.kind, from, &input) {
                Ok(step) => step,
                Err(e) => {
                    debug!(key = %self.key, "Ignoring input: {}", e);
                    continue;
                }
            };

            let mut committed = true;
            for action in step.actions {
                match action {
                    Action::SendLastResponse => {
                        if let Err(e) = self.send_last_response(inner).await {
                            error!(key = %self.key, state = %from, "Transport error: {}", e);
                            inner.last_error = Some(e.to_string());
                            failure.get_or_insert(e);
                            pending.clear();
                            pending.push_back(Input::TransportError);
                            committed = false;
                            break;
                        }
                    }
                    Action::StartTimer(timer) => self.start_timer(inner, timer, &mut pending),
                    Action::BackoffTimer(timer) => {
                        let interval = self.settings.next_g_interval(inner.g_interval);
                        inner.g_interval = interval;
                        self.arm_timer(inner, timer, interval);
                    }
                    Action::CancelTimer(timer) => inner.timers[timer.slot()].cancel(),
                    Action::CancelTimers => inner.cancel_timers(),
                    Action::Notify(notification) => self.notify(inner, notification),
                    Action::Delete => self.delete(inner).await,
                }
            }

            if committed && from != step.next {
                debug!(key = %self.key, "State transition: {} -> {} on {}", from, step.next, input);
                inner.state = step.next;
            }
        }

        failure
    }

    async fn send_last_response(&self, inner: &mut Inner) -> Result<()> {
        let Some(response) = inner.last_response.clone() else {
            trace!(key = %self.key, "No response to retransmit yet");
            return Ok(());
        };
        let lp = inner
            .listening_point
            .clone()
            .ok_or_else(|| Error::NoListeningPoint(self.key.to_string()))?;

        let data = response.export();
        debug!(key = %self.key, "Sending {} to {}:{}", response, inner.host, inner.port);
        trace!(key = %self.key, "Serialized:\n{}", String::from_utf8_lossy(&data));
        lp.send(&inner.host, inner.port, data).await?;
        inner.record(response);
        Ok(())
    }

    fn start_timer(&self, inner: &mut Inner, timer: TimerType, pending: &mut VecDeque<Input>) {
        match self.settings.initial_duration(timer, inner.is_reliable()) {
            None => {
                trace!(key = %self.key, "Timer {} not used on reliable transport", timer);
            }
            Some(duration) if duration.is_zero() => {
                inner.timers[timer.slot()].cancel();
                trace!(key = %self.key, "Timer {} fires immediately", timer);
                pending.push_back(Input::TimerFired(timer));
            }
            Some(duration) => {
                if timer == TimerType::G {
                    inner.g_interval = duration;
                }
                self.arm_timer(inner, timer, duration);
            }
        }
    }

    fn arm_timer(&self, inner: &mut Inner, timer: TimerType, duration: Duration) {
        let slot = &mut inner.timers[timer.slot()];
        slot.cancel();
        let generation = slot.generation;
        let transaction = self.weak_self.clone();
        slot.handle = Some(tokio::spawn(
            async move {
                tokio::time::sleep(duration).await;
                if let Some(transaction) = transaction.upgrade() {
                    transaction.fire_timer(timer, generation).await;
                }
            }
            .instrument(self.span.clone()),
        ));
        trace!(key = %self.key, interval = ?duration, "Started Timer {}", timer);
    }

    async fn fire_timer(&self, timer: TimerType, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.deleted {
            return;
        }
        let slot = &mut inner.timers[timer.slot()];
        if slot.generation != generation {
            trace!(key = %self.key, "Stale Timer {} firing ignored", timer);
            return;
        }
        // This task is the timer; detach it so re-arming does not abort it
        slot.handle.take();

        debug!(key = %self.key, "Timer {} fired", timer);
        self.apply(&mut inner, Input::TimerFired(timer)).await;
    }

    fn notify(&self, inner: &Inner, notification: Notification) {
        let key = self.key.clone();
        let event = match notification {
            Notification::AckReceived => {
                let Some(ack) = inner.last_message.clone() else {
                    return;
                };
                TransactionEvent::AckReceived { key, ack }
            }
            Notification::Timeout => {
                warn!(key = %self.key, "Timer H expired without ACK");
                TransactionEvent::Timeout { key }
            }
            Notification::TransportError => TransactionEvent::TransportError {
                key,
                error: inner
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "transport error".to_string()),
            },
        };
        self.events.emit(event);
    }

    async fn delete(&self, inner: &mut Inner) {
        if inner.deleted {
            return;
        }
        inner.deleted = true;
        inner.cancel_timers();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_transaction(&self.key).await;
        }
        debug!(key = %self.key, "Transaction deleted");
        self.events.emit(TransactionEvent::Terminated {
            key: self.key.clone(),
        });
    }
}

#[async_trait]
impl Transaction for ServerTransaction {
    fn branch_id(&self) -> &str {
        self.key.branch()
    }

    fn origin(&self) -> &SipMessage {
        &self.origin
    }

    async fn set_listening_point(&self, lp: Arc<dyn ListeningPoint>) {
        self.inner.lock().await.listening_point = Some(lp);
    }

    async fn listening_point(&self) -> Option<Arc<dyn ListeningPoint>> {
        self.inner.lock().await.listening_point.clone()
    }

    async fn send(&self, msg: SipMessage, host: &str, port: u16) {
        {
            let mut inner = self.inner.lock().await;
            inner.host = host.to_string();
            inner.port = port;
        }
        if let Err(e) = self.respond(msg).await {
            warn!(key = %self.key, "Response not sent: {}", e);
        }
    }

    async fn receive(&self, msg: SipMessage) {
        let input = match msg.method() {
            Some(Method::Ack) => Input::Ack,
            Some(_) => Input::Retransmission,
            None => {
                warn!(key = %self.key, "Server transaction ignoring inbound response {}", msg);
                return;
            }
        };
        self.process_message(msg, input).await;
    }

    async fn last_message(&self) -> Option<SipMessage> {
        self.inner.lock().await.last_message.clone()
    }

    async fn set_last_message(&self, msg: SipMessage) {
        self.inner.lock().await.last_message = Some(msg);
    }
}

impl fmt::Debug for ServerTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTransaction")
            .field("key", &self.key.to_string())
            .field("kind", &self.kind)
            .field("origin", &self.origin.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigstack_sip_core::StatusCode;
    use sigstack_sip_transport::{MemoryListeningPoint, TransportType};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingRegistry {
        removed: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransactionRegistry for CountingRegistry {
        async fn remove_transaction(&self, key: &TransactionKey) {
            self.removed.lock().push(key.branch().to_string());
        }
    }

    struct Fixture {
        tx: Arc<ServerTransaction>,
        lp: MemoryListeningPoint,
        registry: Arc<CountingRegistry>,
        events: mpsc::Receiver<TransactionEvent>,
    }

    fn fixture(method: Method, transport: TransportType) -> Fixture {
        let lp = MemoryListeningPoint::new("127.0.0.1:5060".parse().unwrap(), transport);
        let registry = Arc::new(CountingRegistry::default());
        let weak: Weak<dyn TransactionRegistry> =
            Arc::downgrade(&(registry.clone() as Arc<dyn TransactionRegistry>));
        let (sink, events) = EventSink::new(64);
        let request = SipMessage::request(method, "sip:bob@example.com", "z9hG4bKtest");
        let tx = ServerTransaction::new(
            request,
            "192.0.2.7:5062".parse().unwrap(),
            Some(Arc::new(lp.clone())),
            TimerSettings::default(),
            sink,
            weak,
            &Span::none(),
        )
        .unwrap();
        Fixture {
            tx,
            lp,
            registry,
            events,
        }
    }

    fn response(f: &Fixture, status: StatusCode) -> SipMessage {
        SipMessage::response_to(f.tx.origin(), status)
    }

    fn drain(events: &mut mpsc::Receiver<TransactionEvent>) -> Vec<TransactionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn starts_in_proceeding_with_request_in_history() {
        let f = fixture(Method::Invite, TransportType::Udp);
        assert_eq!(f.tx.state().await, TransactionState::Proceeding);
        assert_eq!(f.tx.kind(), TransactionKind::InviteServer);
        assert_eq!(f.tx.history().await.len(), 1);
        assert_eq!(f.tx.destination().await, ("192.0.2.7".to_string(), 5062));
    }

    #[tokio::test(start_paused = true)]
    async fn invite_provisional_then_success_deletes_once() {
        let f = fixture(Method::Invite, TransportType::Udp);
        let ringing = response(&f, StatusCode::Ringing);
        assert_eq!(f.tx.respond(ringing).await.unwrap(), TransactionState::Proceeding);
        let ok = response(&f, StatusCode::Ok);
        assert_eq!(f.tx.respond(ok).await.unwrap(), TransactionState::Terminated);

        assert_eq!(f.lp.sent_count(), 2);
        assert_eq!(*f.registry.removed.lock(), vec!["z9hG4bKtest".to_string()]);

        let late = response(&f, StatusCode::Ok);
        assert!(matches!(
            f.tx.respond(late).await,
            Err(Error::InvalidStateTransition { .. })
        ));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.lp.sent_count(), 2);
        assert_eq!(f.registry.removed.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn response_for_another_method_is_rejected() {
        let f = fixture(Method::Invite, TransportType::Udp);
        let cancel = SipMessage::request(Method::Cancel, "sip:bob@example.com", "z9hG4bKtest");
        let ok_to_cancel = SipMessage::response_to(&cancel, StatusCode::Ok);

        assert!(matches!(
            f.tx.respond(ok_to_cancel).await,
            Err(Error::ResponseMismatch { .. })
        ));
        assert_eq!(f.tx.state().await, TransactionState::Proceeding);
        assert_eq!(f.lp.sent_count(), 0);
        assert!(f.registry.removed.lock().is_empty());

        let terminated = response(&f, StatusCode::RequestTerminated);
        assert_eq!(f.tx.respond(terminated).await.unwrap(), TransactionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn retransmission_in_proceeding_resends_last_provisional() {
        let f = fixture(Method::Invite, TransportType::Udp);
        f.tx.process_message(f.tx.origin().clone(), Input::Retransmission).await;
        assert_eq!(f.lp.sent_count(), 0);

        f.tx.respond(response(&f, StatusCode::Trying)).await.unwrap();
        f.tx.process_message(f.tx.origin().clone(), Input::Retransmission).await;
        assert_eq!(f.lp.sent_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_g_backs_off_until_ack() {
        let f = fixture(Method::Invite, TransportType::Udp);
        f.tx.respond(response(&f, StatusCode::BusyHere)).await.unwrap();
        assert_eq!(f.lp.sent_count(), 1);

        // G fires at 500ms, 1500ms, 3500ms
        tokio::time::sleep(Duration::from_millis(3600)).await;
        assert_eq!(f.lp.sent_count(), 4);

        let ack = SipMessage::request(Method::Ack, "sip:bob@example.com", "z9hG4bKtest");
        assert_eq!(
            f.tx.process_message(ack, Input::Ack).await,
            TransactionState::Confirmed
        );
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(f.lp.sent_count(), 4);
        assert_eq!(f.tx.state().await, TransactionState::Confirmed);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.tx.state().await, TransactionState::Terminated);
        assert_eq!(f.registry.removed.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_tears_down_from_pre_transition_state() {
        let mut f = fixture(Method::Invite, TransportType::Udp);
        f.lp.fail_sends(true);
        let result = f.tx.respond(response(&f, StatusCode::Ok)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(f.tx.state().await, TransactionState::Terminated);
        assert_eq!(f.registry.removed.lock().len(), 1);

        let events = drain(&mut f.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, TransactionEvent::TransportError { .. })));
        assert!(matches!(events.last(), Some(TransactionEvent::Terminated { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn reliable_transport_skips_g_and_fires_i_immediately() {
        let f = fixture(Method::Invite, TransportType::Tcp);
        f.tx.respond(response(&f, StatusCode::NotFound)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.lp.sent_count(), 1);

        let ack = SipMessage::request(Method::Ack, "sip:bob@example.com", "z9hG4bKtest");
        assert_eq!(
            f.tx.process_message(ack, Input::Ack).await,
            TransactionState::Terminated
        );
        assert_eq!(f.registry.removed.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_invite_final_on_reliable_transport_terminates_at_once() {
        let f = fixture(Method::Register, TransportType::Tls);
        let state = f.tx.respond(response(&f, StatusCode::Ok)).await.unwrap();
        assert_eq!(state, TransactionState::Terminated);
        assert_eq!(f.lp.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_is_idempotent_and_silences_timers() {
        let f = fixture(Method::Invite, TransportType::Udp);
        f.tx.respond(response(&f, StatusCode::Decline)).await.unwrap();
        assert!(f.tx.terminate().await);
        assert!(!f.tx.terminate().await);
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(f.lp.sent_count(), 1);
        assert!(f.registry.removed.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_bounded() {
        let f = fixture(Method::Options, TransportType::Udp);
        f.tx.respond(response(&f, StatusCode::Trying)).await.unwrap();
        for _ in 0..40 {
            f.tx.process_message(f.tx.origin().clone(), Input::Retransmission).await;
        }
        assert_eq!(f.tx.history().await.len(), HISTORY_LIMIT);
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_trait_send_updates_destination() {
        let f = fixture(Method::Options, TransportType::Udp);
        let ok = response(&f, StatusCode::Ok);
        Transaction::send(f.tx.as_ref(), ok.clone(), "198.51.100.2", 5080).await;
        let sent = f.lp.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].host.as_str(), sent[0].port), ("198.51.100.2", 5080));
        assert_eq!(f.tx.last_message().await, Some(ok));
        assert_eq!(f.tx.state().await, TransactionState::Completed);
    }
}
