//! Event bridge behavior against the in-memory provider

mod common;

use std::time::Duration;

use common::*;
use serde_json::{json, Value};
use tokio::sync::watch;
use wallet_sync::bridge::{subscribe, EventStream};

fn as_string(payload: Value) -> Option<String> {
    payload.as_str().map(str::to_string)
}

fn stream(provider: &std::sync::Arc<MockProvider>, stop: &watch::Receiver<bool>) -> EventStream<String> {
    subscribe(provider.clone(), "chainChanged", stop.clone(), as_string)
}

#[tokio::test]
async fn test_events_arrive_in_order_without_batching() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (_stop, stop_rx) = watch::channel(false);
    let mut events = stream(&provider, &stop_rx);

    provider.chain_changed("0x1");
    provider.chain_changed("0x89");
    provider.chain_changed("0x89");

    assert_eq!(events.next().await.as_deref(), Some("0x1"));
    assert_eq!(events.next().await.as_deref(), Some("0x89"));
    assert_eq!(events.next().await.as_deref(), Some("0x89"));
    assert_eq!(provider.listener_count("chainChanged"), 1);
}

#[tokio::test]
async fn test_undecodable_payloads_are_skipped() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (_stop, stop_rx) = watch::channel(false);
    let mut events = stream(&provider, &stop_rx);

    provider.emit("chainChanged", json!({"unexpected": true}));
    provider.chain_changed("0x5");

    assert_eq!(events.next().await.as_deref(), Some("0x5"));
}

#[tokio::test]
async fn test_stop_signal_ends_stream_and_removes_listener_once() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (stop, stop_rx) = watch::channel(false);
    let mut events = stream(&provider, &stop_rx);

    let pending = tokio::spawn(async move {
        let first = events.next().await;
        (first, events)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.send_replace(true);

    let (first, mut events) = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert_eq!(first, None);
    assert!(events.is_closed());
    assert_eq!(provider.listener_count("chainChanged"), 0);

    provider.chain_changed("0x89");
    assert_eq!(events.next().await, None);

    events.close();
    drop(events);
    assert_eq!(provider.removals(), 1);
}

#[tokio::test]
async fn test_stop_before_poll_drops_queued_events() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (stop, stop_rx) = watch::channel(false);
    let mut events = stream(&provider, &stop_rx);

    provider.chain_changed("0x89");
    stop.send_replace(true);

    assert_eq!(events.next().await, None);
    assert_eq!(provider.removals(), 1);
}

#[tokio::test]
async fn test_drop_removes_listener() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (_stop, stop_rx) = watch::channel(false);

    let first = stream(&provider, &stop_rx);
    let _second = stream(&provider, &stop_rx);
    assert_eq!(provider.listener_count("chainChanged"), 2);

    drop(first);
    assert_eq!(provider.listener_count("chainChanged"), 1);
    assert_eq!(provider.removals(), 1);
}

#[tokio::test]
async fn test_dropped_stop_sender_ends_stream() {
    let provider = MockProvider::new(&[ADDR_A], "0x1");
    let (stop, stop_rx) = watch::channel(false);
    let mut events = stream(&provider, &stop_rx);
    drop(stop_rx);

    drop(stop);
    assert_eq!(events.next().await, None);
    assert_eq!(provider.listener_count("chainChanged"), 0);
}
