//! Dispatcher fan-out, ordering and backpressure

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use sigstack_dispatcher::{DispatcherConfig, EventDispatcher};
use sigstack_sip_core::{Method, SipMessage};
use sigstack_sip_transport::{MemoryListeningPoint, SipEvent, TransportType};

fn memory_lp(port: u16) -> MemoryListeningPoint {
    MemoryListeningPoint::new(SocketAddr::from(([127, 0, 0, 1], port)), TransportType::Udp)
}

fn peer() -> SocketAddr {
    "192.0.2.1:5060".parse().unwrap()
}

fn request(branch: &str) -> SipMessage {
    SipMessage::request(Method::Options, "sip:svc@example.com", branch)
}

async fn recv(rx: &mut mpsc::Receiver<SipEvent>) -> SipEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

#[tokio::test]
async fn every_channel_sees_every_event_in_order() {
    let dispatcher = EventDispatcher::default();
    let lp_a = memory_lp(5060);
    let lp_b = memory_lp(5070);
    dispatcher.add_listen_point(Arc::new(lp_a.clone()));
    dispatcher.add_listen_point(Arc::new(lp_b.clone()));

    let mut receivers: Vec<_> = (0..3).map(|_| dispatcher.subscribe()).collect();

    let runner = dispatcher.clone();
    tokio::spawn(async move { runner.start().await });

    for i in 0..4 {
        lp_a.inject(request(&format!("z9hG4bKa{i}")), peer()).await.unwrap();
        lp_b.inject(request(&format!("z9hG4bKb{i}")), peer()).await.unwrap();
    }

    for rx in receivers.iter_mut() {
        let mut from_a = Vec::new();
        let mut from_b = Vec::new();
        for _ in 0..8 {
            let event = recv(rx).await;
            let port = event.listening_point().unwrap().local_addr().port();
            let branch = event.message().branch().unwrap().to_string();
            if port == 5060 {
                from_a.push(branch);
            } else {
                from_b.push(branch);
            }
        }
        // Per listening point order is preserved, interleaving between them is not defined
        assert_eq!(from_a, vec!["z9hG4bKa0", "z9hG4bKa1", "z9hG4bKa2", "z9hG4bKa3"]);
        assert_eq!(from_b, vec!["z9hG4bKb0", "z9hG4bKb1", "z9hG4bKb2", "z9hG4bKb3"]);
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.received, 8);
    assert_eq!(stats.delivered, 24);
}

#[tokio::test(start_paused = true)]
async fn slow_consumer_is_reported_but_never_loses_events() {
    let config = DispatcherConfig {
        channel_capacity: 1,
        send_deadline_ms: 200,
    };
    let dispatcher = EventDispatcher::new(config);
    let lp = memory_lp(5060);
    dispatcher.add_listen_point(Arc::new(lp.clone()));
    let mut rx = dispatcher.subscribe();

    let runner = dispatcher.clone();
    tokio::spawn(async move { runner.start().await });

    for i in 0..3 {
        lp.inject(request(&format!("z9hG4bK{i}")), peer()).await.unwrap();
    }

    // Nobody reads for a while: the second event is stuck behind the first
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(dispatcher.stats().starved >= 1);

    for i in 0..3 {
        let event = recv(&mut rx).await;
        assert_eq!(event.message().branch(), Some(format!("z9hG4bK{i}").as_str()));
    }
    assert_eq!(dispatcher.stats().delivered, 3);
}

#[tokio::test]
async fn dropped_consumer_does_not_block_the_others() {
    let dispatcher = EventDispatcher::default();
    let lp = memory_lp(5060);
    dispatcher.add_listen_point(Arc::new(lp.clone()));

    let gone = dispatcher.subscribe();
    drop(gone);
    let mut alive = dispatcher.subscribe();

    let runner = dispatcher.clone();
    tokio::spawn(async move { runner.start().await });

    lp.inject(request("z9hG4bKonly"), peer()).await.unwrap();
    let event = recv(&mut alive).await;
    assert_eq!(event.message().branch(), Some("z9hG4bKonly"));
    assert_eq!(dispatcher.stats().closed_channels, 1);
}

#[tokio::test]
async fn start_returns_once_all_listening_points_close() {
    let dispatcher = EventDispatcher::default();
    let lp_a = memory_lp(5060);
    let lp_b = memory_lp(5070);
    dispatcher.add_listen_point(Arc::new(lp_a.clone()));
    dispatcher.add_listen_point(Arc::new(lp_b.clone()));
    let _rx = dispatcher.subscribe();

    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.start().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    lp_a.close();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    lp_b.close();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[test]
fn config_from_toml_uses_defaults_for_missing_fields() {
    let config: DispatcherConfig = toml::from_str("send_deadline_ms = 50").unwrap();
    assert_eq!(config.send_deadline(), Duration::from_millis(50));
    assert_eq!(config.channel_capacity, sigstack_dispatcher::config::DEFAULT_CHANNEL_CAPACITY);
}
