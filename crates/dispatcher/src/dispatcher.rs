use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

use sigstack_sip_transport::{ListeningPoint, SipEvent};

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};

/// Counters describing what the dispatcher has delivered so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Events read from listening points
    pub received: u64,
    /// Event copies handed to consumer channels
    pub delivered: u64,
    /// Sends that exceeded the deadline before a slot freed up
    pub starved: u64,
    /// Event copies not delivered because the consumer was gone
    pub closed_channels: u64,
}

/// Fans inbound events from every listening point out to every consumer channel
///
/// Cloning is cheap and every clone refers to the same dispatcher.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: DispatcherConfig,
    listening_points: RwLock<Vec<Arc<dyn ListeningPoint>>>,
    channels: RwLock<Vec<mpsc::Sender<SipEvent>>>,
    received: AtomicU64,
    delivered: AtomicU64,
    starved: AtomicU64,
    closed_channels: AtomicU64,
    span: Span,
}

impl EventDispatcher {
    /// Creates a dispatcher that logs under its own `dispatcher` span
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_span(config, info_span!("dispatcher"))
    }

    /// Creates a dispatcher whose tasks are instrumented with `span`
    pub fn with_span(config: DispatcherConfig, span: Span) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                listening_points: RwLock::new(Vec::new()),
                channels: RwLock::new(Vec::new()),
                received: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                starved: AtomicU64::new(0),
                closed_channels: AtomicU64::new(0),
                span,
            }),
        }
    }

    /// Registers a listening point to read from
    pub fn add_listen_point(&self, lp: Arc<dyn ListeningPoint>) {
        let _enter = self.inner.span.enter();
        debug!(local = %lp.local_addr(), transport = %lp.transport_type(), "Listening point added");
        self.inner.listening_points.write().push(lp);
    }

    /// Registers a consumer channel. Channels receive events in registration order.
    pub fn add_channel(&self, tx: mpsc::Sender<SipEvent>) {
        self.inner.channels.write().push(tx);
    }

    /// Creates a channel with the configured capacity, registers it and returns its receiver
    pub fn subscribe(&self) -> mpsc::Receiver<SipEvent> {
        let (tx, rx) = mpsc::channel(self.inner.config.channel_capacity.max(1));
        self.add_channel(tx);
        rx
    }

    /// Drops every registered consumer channel.
    ///
    /// Receivers still yield the events already queued and then end. Used
    /// after [`start`](Self::start) returns so consumers can drain.
    pub fn close_channels(&self) {
        let closed = std::mem::take(&mut *self.inner.channels.write());
        debug!(parent: &self.inner.span, channels = closed.len(), "Consumer channels closed");
    }

    /// Number of registered listening points
    pub fn listening_point_count(&self) -> usize {
        self.inner.listening_points.read().len()
    }

    /// Number of registered consumer channels
    pub fn channel_count(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            received: self.inner.received.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            starved: self.inner.starved.load(Ordering::Relaxed),
            closed_channels: self.inner.closed_channels.load(Ordering::Relaxed),
        }
    }

    /// Starts every listening point and runs one reader task for each.
    ///
    /// Returns once every listening point has closed, which in normal
    /// operation never happens. Listening points added after this call are
    /// not read; channels added later start receiving from the next event.
    pub async fn start(&self) -> Result<()> {
        let listening_points = self.inner.listening_points.read().clone();
        if listening_points.is_empty() {
            return Err(Error::NoListeningPoints);
        }

        for lp in &listening_points {
            lp.start().await?;
        }

        info!(
            parent: &self.inner.span,
            listening_points = listening_points.len(),
            channels = self.channel_count(),
            "Starting event dispatcher"
        );

        let readers = listening_points.into_iter().map(|lp| {
            let dispatcher = self.clone();
            let span = info_span!(parent: &self.inner.span, "reader", local = %lp.local_addr());
            tokio::spawn(async move { dispatcher.read_loop(lp).await }.instrument(span))
        });

        for result in join_all(readers).await {
            if let Err(e) = result {
                error!(parent: &self.inner.span, "Reader task failed: {}", e);
            }
        }

        info!(parent: &self.inner.span, "All listening points closed, dispatcher stopped");
        Ok(())
    }

    async fn read_loop(&self, lp: Arc<dyn ListeningPoint>) {
        while let Some(event) = lp.read().await {
            self.inner.received.fetch_add(1, Ordering::Relaxed);
            let event = event.with_listening_point(lp.clone());
            trace!(source = %event.source(), "Dispatching {}", event.message());
            self.broadcast(event).await;
        }
        debug!("Listening point closed");
    }

    async fn broadcast(&self, event: SipEvent) {
        // Snapshot so registration never waits on a blocked consumer
        let channels = self.inner.channels.read().clone();
        for (index, tx) in channels.iter().enumerate() {
            self.deliver(index, tx, event.clone()).await;
        }
    }

    async fn deliver(&self, index: usize, tx: &mpsc::Sender<SipEvent>, event: SipEvent) {
        let deadline = self.inner.config.send_deadline();
        let permit = match tokio::time::timeout(deadline, tx.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                self.inner.closed_channels.fetch_add(1, Ordering::Relaxed);
                warn!(channel = index, "Consumer channel closed, event not delivered");
                return;
            }
            Err(_) => {
                self.inner.starved.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = index,
                    deadline_ms = deadline.as_millis() as u64,
                    "Consumer channel full past deadline, still waiting"
                );
                match tx.reserve().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.inner.closed_channels.fetch_add(1, Ordering::Relaxed);
                        warn!(channel = index, "Consumer channel closed, event not delivered");
                        return;
                    }
                }
            }
        };
        permit.send(event);
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigstack_sip_transport::{MemoryListeningPoint, TransportType};

    #[tokio::test]
    async fn start_without_listening_points_fails() {
        let dispatcher = EventDispatcher::default();
        assert!(matches!(dispatcher.start().await, Err(Error::NoListeningPoints)));
    }

    #[test]
    fn registration_counts() {
        let dispatcher = EventDispatcher::default();
        let lp = MemoryListeningPoint::new("127.0.0.1:5060".parse().unwrap(), TransportType::Udp);
        dispatcher.add_listen_point(Arc::new(lp));
        let _rx = dispatcher.subscribe();
        let (tx, _rx2) = mpsc::channel(1);
        dispatcher.add_channel(tx);
        assert_eq!(dispatcher.listening_point_count(), 1);
        assert_eq!(dispatcher.channel_count(), 2);
        assert_eq!(dispatcher.stats(), DispatcherStats::default());
    }

    #[tokio::test]
    async fn close_channels_ends_receivers_after_queued_events() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        let lp: Arc<dyn ListeningPoint> = Arc::new(MemoryListeningPoint::new(
            "127.0.0.1:5060".parse().unwrap(),
            TransportType::Udp,
        ));
        let message = sigstack_sip_core::SipMessage::request(
            sigstack_sip_core::Method::Options,
            "sip:alice@example.com",
            "z9hG4bK-close",
        );
        dispatcher
            .broadcast(SipEvent::new(message, "192.0.2.10:5062".parse().unwrap()).with_listening_point(lp))
            .await;

        dispatcher.close_channels();
        assert_eq!(dispatcher.channel_count(), 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
