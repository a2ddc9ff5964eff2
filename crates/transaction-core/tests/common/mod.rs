//! Shared helpers for transaction manager tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use sigstack_sip_core::{Method, SipMessage, StatusCode};
use sigstack_sip_transport::{MemoryListeningPoint, SipEvent, TransportType};
use sigstack_transaction_core::{TimerSettings, TransactionEvent, TransactionKey, TransactionManager};

pub const PEER: &str = "192.0.2.10:5062";

pub struct TestStack {
    pub manager: TransactionManager,
    pub events: mpsc::Receiver<TransactionEvent>,
    pub lp: MemoryListeningPoint,
}

impl TestStack {
    pub fn new(transport: TransportType) -> Self {
        let lp = MemoryListeningPoint::new("127.0.0.1:5060".parse().unwrap(), transport);
        let (manager, events) = TransactionManager::new(TimerSettings::default());
        Self { manager, events, lp }
    }

    pub fn udp() -> Self {
        Self::new(TransportType::Udp)
    }

    /// Wraps `message` the way the dispatcher hands it to the manager
    pub fn event(&self, message: SipMessage) -> SipEvent {
        SipEvent::new(message, peer()).with_listening_point(Arc::new(self.lp.clone()))
    }

    /// Next queued event, if any
    pub fn next_event(&mut self) -> Option<TransactionEvent> {
        self.events.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<TransactionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn peer() -> SocketAddr {
    PEER.parse().unwrap()
}

pub fn request(method: Method, branch: &str) -> SipMessage {
    SipMessage::request(method, "sip:alice@example.com", branch)
}

pub fn key_for(method: Method, branch: &str) -> TransactionKey {
    TransactionKey::new(branch, method)
}

pub fn response(request: &SipMessage, status: StatusCode) -> SipMessage {
    SipMessage::response_to(request, status)
}
