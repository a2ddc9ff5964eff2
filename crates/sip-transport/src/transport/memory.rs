//! In-process listening point
//!
//! [`MemoryListeningPoint`] never touches a socket. Inbound traffic is
//! injected with [`inject`](MemoryListeningPoint::inject) and every outbound
//! send is recorded, so callers can observe exactly what a transaction put
//! on the wire. Sends can be made to fail to exercise transport-error paths.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

use sigstack_sip_core::SipMessage;

use crate::error::{Error, Result};
use crate::transport::{ListeningPoint, SipEvent, TransportType};

// Default inbound queue capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// One recorded outbound send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Destination host
    pub host: String,
    /// Destination port
    pub port: u16,
    /// Bytes handed to the transport
    pub data: Bytes,
}

/// Listening point backed by in-process channels
#[derive(Clone)]
pub struct MemoryListeningPoint {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    local_addr: SocketAddr,
    transport_type: TransportType,
    inbound_tx: Mutex<Option<mpsc::Sender<SipEvent>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<SipEvent>>,
    push_tx: Mutex<Option<mpsc::Sender<SipEvent>>>,
    sent: Mutex<Vec<SentMessage>>,
    sent_notify: Notify,
    fail_sends: AtomicBool,
    closed: AtomicBool,
    started: AtomicBool,
}

impl MemoryListeningPoint {
    /// Creates a listening point with the given local address and transport kind
    pub fn new(local_addr: SocketAddr, transport_type: TransportType) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                local_addr,
                transport_type,
                inbound_tx: Mutex::new(Some(inbound_tx)),
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                push_tx: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                sent_notify: Notify::new(),
                fail_sends: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Queues an inbound message as if it arrived from `source`
    pub async fn inject(&self, message: SipMessage, source: SocketAddr) -> Result<()> {
        let tx = self
            .inner
            .inbound_tx
            .lock()
            .clone()
            .ok_or(Error::TransportClosed)?;
        trace!(local = %self.inner.local_addr, %source, "Injecting {}", message);
        tx.send(SipEvent::new(message, source)).await?;
        Ok(())
    }

    /// Makes every following send fail (or succeed again)
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Closes the listening point.
    ///
    /// Messages already queued are still delivered, after which `read`
    /// returns `None`. Sends fail from now on.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.inbound_tx.lock().take();
        debug!(local = %self.inner.local_addr, "Memory listening point closed");
    }

    /// Returns true once `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Every send recorded so far, oldest first
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().clone()
    }

    /// Number of sends recorded so far
    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    /// Drains and returns the recorded sends
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.inner.sent.lock())
    }

    /// Waits until at least `count` sends have been recorded
    pub async fn wait_for_sends(&self, count: usize) {
        loop {
            let notified = self.inner.sent_notify.notified();
            if self.sent_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn spawn_push_forwarder(&self, push_tx: mpsc::Sender<SipEvent>) {
        let lp = self.clone();
        tokio::spawn(async move {
            let origin: Arc<dyn ListeningPoint> = Arc::new(lp.clone());
            loop {
                let event = {
                    let mut rx = lp.inner.inbound_rx.lock().await;
                    rx.recv().await
                };
                let Some(event) = event else {
                    debug!(local = %lp.inner.local_addr, "Inbound queue closed, stopping push forwarder");
                    break;
                };
                if push_tx
                    .send(event.with_listening_point(origin.clone()))
                    .await
                    .is_err()
                {
                    warn!(local = %lp.inner.local_addr, "Push channel receiver dropped");
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl ListeningPoint for MemoryListeningPoint {
    fn build(host: &str, port: u16) -> Result<Self> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{host}:{port}")))?;
        Ok(Self::new(SocketAddr::new(ip, port), TransportType::Udp))
    }

    async fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let push_tx = self.inner.push_tx.lock().clone();
        if let Some(push_tx) = push_tx {
            self.spawn_push_forwarder(push_tx);
        }
        debug!(local = %self.inner.local_addr, transport = %self.inner.transport_type, "Memory listening point started");
        Ok(())
    }

    async fn read(&self) -> Option<SipEvent> {
        self.inner.inbound_rx.lock().await.recv().await
    }

    async fn send(&self, host: &str, port: u16, data: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if host.is_empty() || port == 0 {
            return Err(Error::InvalidAddress(format!("{host}:{port}")));
        }
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::SendFailed {
                host: host.to_string(),
                port,
                reason: "send failure injected".to_string(),
            });
        }

        trace!(local = %self.inner.local_addr, "Sending {} bytes to {}:{}", data.len(), host, port);
        self.inner.sent.lock().push(SentMessage {
            host: host.to_string(),
            port,
            data,
        });
        self.inner.sent_notify.notify_waiters();
        Ok(())
    }

    fn set_transport_channel(&self, tx: mpsc::Sender<SipEvent>) {
        *self.inner.push_tx.lock() = Some(tx);
    }

    fn transport_type(&self) -> TransportType {
        self.inner.transport_type
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigstack_sip_core::Method;

    fn options(branch: &str) -> SipMessage {
        SipMessage::request(Method::Options, "sip:alice@example.com", branch)
    }

    fn peer() -> SocketAddr {
        "192.0.2.10:5060".parse().unwrap()
    }

    #[tokio::test]
    async fn read_returns_injected_then_none_after_close() {
        let lp = MemoryListeningPoint::build("127.0.0.1", 5060).unwrap();
        lp.inject(options("z9hG4bK1"), peer()).await.unwrap();
        lp.close();

        let event = lp.read().await.unwrap();
        assert_eq!(event.message().branch(), Some("z9hG4bK1"));
        assert_eq!(event.source(), peer());
        assert!(lp.read().await.is_none());
        assert!(matches!(lp.inject(options("z9hG4bK2"), peer()).await, Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn sends_are_recorded_and_can_fail() {
        let lp = MemoryListeningPoint::new("127.0.0.1:5060".parse().unwrap(), TransportType::Udp);
        lp.send("192.0.2.10", 5060, Bytes::from_static(b"SIP/2.0 200 OK\r\n\r\n"))
            .await
            .unwrap();
        assert_eq!(lp.sent_count(), 1);
        assert_eq!(lp.sent_messages()[0].host, "192.0.2.10");

        lp.fail_sends(true);
        let err = lp.send("192.0.2.10", 5060, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::SendFailed { port: 5060, .. }));
        assert_eq!(lp.sent_count(), 1);

        assert!(matches!(
            lp.send("", 5060, Bytes::new()).await,
            Err(Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn push_mode_forwards_stamped_events() {
        let lp = MemoryListeningPoint::build("127.0.0.1", 5070).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        lp.set_transport_channel(tx);
        lp.start().await.unwrap();

        lp.inject(options("z9hG4bKpush"), peer()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message().branch(), Some("z9hG4bKpush"));
        let origin = event.listening_point().unwrap();
        assert_eq!(origin.local_addr().port(), 5070);
    }

    #[test]
    fn build_rejects_hostnames() {
        assert!(matches!(
            MemoryListeningPoint::build("not an ip", 5060),
            Err(Error::InvalidAddress(_))
        ));
    }
}
