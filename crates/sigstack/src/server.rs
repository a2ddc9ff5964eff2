use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, Span};

use sigstack_dispatcher::{DispatcherStats, EventDispatcher};
use sigstack_sip_transport::{ListeningPoint, SipEvent};
use sigstack_transaction_core::{TransactionEvent, TransactionManager};

use crate::config::StackConfig;
use crate::error::{Error, Result};

/// A SIP server: listening points, an event dispatcher and a transaction manager
///
/// The first dispatcher channel belongs to the transaction manager. Further
/// channels opened with [`observe`](Self::observe) receive a copy of every
/// inbound event but take no part in transaction handling.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sigstack::{SipServer, StackConfig};
/// use sigstack::sip_transport::MemoryListeningPoint;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (mut server, mut events) = SipServer::new(StackConfig::default());
/// server.listen::<MemoryListeningPoint>("127.0.0.1", 5060)?;
///
/// tokio::spawn(async move { server.run().await });
///
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SipServer {
    config: StackConfig,
    dispatcher: EventDispatcher,
    manager: TransactionManager,
    transaction_rx: Option<mpsc::Receiver<SipEvent>>,
    span: Span,
}

impl SipServer {
    /// Creates a server and the receiver for its transaction events
    pub fn new(config: StackConfig) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let span = info_span!("sigstack");
        let dispatcher = EventDispatcher::with_span(
            config.dispatcher.clone(),
            info_span!(parent: &span, "dispatcher"),
        );
        let (manager, events) = TransactionManager::with_config(
            config.timers,
            config.event_capacity,
            info_span!(parent: &span, "transaction_manager"),
        );
        let transaction_rx = Some(dispatcher.subscribe());

        let server = Self {
            config,
            dispatcher,
            manager,
            transaction_rx,
            span,
        };
        (server, events)
    }

    /// The configuration the server was built with
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Handle to the transaction manager, for sending responses
    pub fn manager(&self) -> TransactionManager {
        self.manager.clone()
    }

    /// Registers an already built listening point
    pub fn add_listen_point(&self, lp: Arc<dyn ListeningPoint>) {
        self.dispatcher.add_listen_point(lp);
    }

    /// Builds a listening point of type `L` on `host:port` and registers it
    pub fn listen<L>(&self, host: &str, port: u16) -> Result<Arc<L>>
    where
        L: ListeningPoint + 'static,
    {
        let lp = Arc::new(L::build(host, port)?);
        self.add_listen_point(lp.clone());
        Ok(lp)
    }

    /// Opens an observer channel that gets a copy of every inbound event
    pub fn observe(&self) -> mpsc::Receiver<SipEvent> {
        self.dispatcher.subscribe()
    }

    /// Dispatcher delivery counters
    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Runs until every listening point has closed, then lets the manager
    /// process every event already queued and terminates all remaining
    /// transactions.
    pub async fn run(&mut self) -> Result<()> {
        if self.dispatcher.listening_point_count() == 0 {
            return Err(Error::NoListeningPoints);
        }
        let rx = self.transaction_rx.take().ok_or(Error::AlreadyStarted)?;

        info!(
            parent: &self.span,
            listening_points = self.dispatcher.listening_point_count(),
            observers = self.dispatcher.channel_count() - 1,
            "Starting SIP server"
        );
        let consumer = self.manager.spawn_consumer(rx);

        let result = self.dispatcher.start().await;

        debug!(parent: &self.span, "Dispatcher stopped, draining queued events");
        self.dispatcher.close_channels();
        if let Err(e) = consumer.await {
            error!(parent: &self.span, "Transaction consumer failed: {}", e);
        }
        self.manager.shutdown().await;
        info!(parent: &self.span, "SIP server stopped");

        result.map_err(Error::from)
    }
}
