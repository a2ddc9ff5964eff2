//! Transport-facing traits and the event type they produce
//!
//! Two capability sets meet here:
//!
//! * [`ListeningPoint`]: one local endpoint that reads inbound messages and
//!   sends bytes to a host and port;
//! * [`Transaction`]: what transport code may ask of a transaction (its
//!   identity, the listening point it answers through, the last message it
//!   handled).
//!
//! Both are used as trait objects (`Arc<dyn ListeningPoint>`,
//! `Arc<dyn Transaction>`) so a [`SipEvent`] can carry either.

pub mod memory;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use sigstack_sip_core::SipMessage;

use crate::error::Result;

/// Kind of transport behind a listening point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// UDP
    Udp,
    /// TCP
    Tcp,
    /// TLS over TCP
    Tls,
    /// WebSocket
    Ws,
    /// Secure WebSocket
    Wss,
}

impl TransportType {
    /// Reliable transports deliver in order and retransmit on their own,
    /// so the transaction layer arms no retransmission timers for them.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, TransportType::Udp)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportType::Udp => "UDP",
            TransportType::Tcp => "TCP",
            TransportType::Tls => "TLS",
            TransportType::Ws => "WS",
            TransportType::Wss => "WSS",
        };
        f.write_str(name)
    }
}

/// A local transport endpoint
///
/// Two delivery modes are supported. In pull mode a consumer calls
/// [`read`](ListeningPoint::read) in a loop. In push mode a channel is
/// installed with [`set_transport_channel`](ListeningPoint::set_transport_channel)
/// before [`start`](ListeningPoint::start), and inbound events are forwarded
/// there instead.
#[async_trait]
pub trait ListeningPoint: Send + Sync {
    /// Creates a listening point for `host:port`. Nothing is bound until `start`.
    fn build(host: &str, port: u16) -> Result<Self>
    where
        Self: Sized;

    /// Begins accepting inbound traffic
    async fn start(&self) -> Result<()>;

    /// Waits for the next inbound event. `None` once the listening point is closed.
    async fn read(&self) -> Option<SipEvent>;

    /// Sends serialized bytes to `host:port`
    async fn send(&self, host: &str, port: u16, data: Bytes) -> Result<()>;

    /// Installs the push-mode delivery channel
    fn set_transport_channel(&self, tx: mpsc::Sender<SipEvent>);

    /// The kind of transport behind this listening point
    fn transport_type(&self) -> TransportType;

    /// The local address this listening point is bound to
    fn local_addr(&self) -> SocketAddr;
}

/// Operations transport code may perform on a transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Branch token identifying the transaction
    fn branch_id(&self) -> &str;

    /// The request that created the transaction
    fn origin(&self) -> &SipMessage;

    /// Assigns the listening point responses go out through
    async fn set_listening_point(&self, lp: Arc<dyn ListeningPoint>);

    /// The assigned listening point, if any
    async fn listening_point(&self) -> Option<Arc<dyn ListeningPoint>>;

    /// Sends a message towards `host:port` through the assigned listening point.
    ///
    /// Failures are not returned: they terminate the transaction and are
    /// reported to its user.
    async fn send(&self, msg: SipMessage, host: &str, port: u16);

    /// Feeds an inbound message into the transaction
    async fn receive(&self, msg: SipMessage);

    /// The last message sent or received
    async fn last_message(&self) -> Option<SipMessage>;

    /// Records a message as the last one handled
    async fn set_last_message(&self, msg: SipMessage);
}

/// An inbound message together with where it came from
#[derive(Clone)]
pub struct SipEvent {
    message: SipMessage,
    source: SocketAddr,
    listening_point: Option<Arc<dyn ListeningPoint>>,
    transaction: Option<Arc<dyn Transaction>>,
}

impl SipEvent {
    /// Creates an event for a message received from `source`
    pub fn new(message: SipMessage, source: SocketAddr) -> Self {
        Self {
            message,
            source,
            listening_point: None,
            transaction: None,
        }
    }

    /// Returns the event stamped with its originating listening point
    pub fn with_listening_point(mut self, lp: Arc<dyn ListeningPoint>) -> Self {
        self.listening_point = Some(lp);
        self
    }

    /// The carried message
    pub fn message(&self) -> &SipMessage {
        &self.message
    }

    /// Consumes the event, returning the message
    pub fn into_message(self) -> SipMessage {
        self.message
    }

    /// Address the message came from
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    /// Listening point the message arrived on
    pub fn listening_point(&self) -> Option<&Arc<dyn ListeningPoint>> {
        self.listening_point.as_ref()
    }

    /// Transaction the event has been matched to
    pub fn transaction(&self) -> Option<&Arc<dyn Transaction>> {
        self.transaction.as_ref()
    }

    /// Associates the event with a transaction
    pub fn set_transaction(&mut self, transaction: Arc<dyn Transaction>) {
        self.transaction = Some(transaction);
    }
}

impl fmt::Debug for SipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipEvent")
            .field("message", &self.message.to_string())
            .field("source", &self.source)
            .field(
                "listening_point",
                &self
                    .listening_point
                    .as_ref()
                    .map(|lp| format!("{}/{}", lp.local_addr(), lp.transport_type())),
            )
            .field(
                "transaction",
                &self.transaction.as_ref().map(|t| t.branch_id().to_string()),
            )
            .finish()
    }
}
