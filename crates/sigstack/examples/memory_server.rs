//! Runs a server on an in-memory listening point and plays a short INVITE
//! exchange against it: the TU rejects the call with 486, the peer ACKs.
//!
//! ```text
//! RUST_LOG=sigstack_transaction_core=trace cargo run -p sigstack --example memory_server
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use sigstack::prelude::*;
use sigstack::{log_welcome, setup_logging};

const CONFIG: &str = r#"
event_capacity = 32

[timers]
t1 = 100

[logging]
level = "debug"
app_name = "memory_server"
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StackConfig::from_toml_str(CONFIG).context("parsing config")?;
    setup_logging(&config.logging)?;
    log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));

    let (mut server, mut events) = SipServer::new(config);
    let lp = MemoryListeningPoint::new("127.0.0.1:5060".parse()?, TransportType::Udp);
    server.add_listen_point(Arc::new(lp.clone()));
    let manager = server.manager();
    let server_task = tokio::spawn(async move { server.run().await });

    let peer: SocketAddr = "192.0.2.50:5060".parse()?;
    let branch = "z9hG4bK-example-1";
    let invite = SipMessage::request(Method::Invite, "sip:bob@example.com", branch);
    lp.inject(invite.clone(), peer).await?;
    // A retransmission before the TU answers is absorbed
    lp.inject(invite, peer).await?;

    while let Some(event) = events.recv().await {
        match event {
            TransactionEvent::NewRequest { key, request, .. } => {
                info!(%key, "TU got {}", request);
                manager
                    .send_response(&key, SipMessage::response_to(&request, StatusCode::Ringing))
                    .await?;
                manager
                    .send_response(&key, SipMessage::response_to(&request, StatusCode::BusyHere))
                    .await?;
                lp.inject(SipMessage::request(Method::Ack, "sip:bob@example.com", key.branch()), peer)
                    .await?;
            }
            TransactionEvent::AckReceived { key, .. } => {
                info!(%key, "Call rejected and acknowledged");
            }
            TransactionEvent::Terminated { key } => {
                info!(%key, "Transaction finished");
                break;
            }
            other => info!("TU event {:?}", other),
        }
    }

    for sent in lp.sent_messages() {
        info!(
            "Sent to {}:{}\n{}",
            sent.host,
            sent.port,
            String::from_utf8_lossy(&sent.data)
        );
    }

    lp.close();
    tokio::time::timeout(Duration::from_secs(1), server_task)
        .await
        .context("server did not stop")???;
    Ok(())
}
