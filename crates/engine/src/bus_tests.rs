// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use colony_core::test_support::ping_event;
use std::time::Duration;

#[tokio::test]
async fn enqueue_then_recv_preserves_order() {
    let (bus, mut reader) = EventBus::new();
    bus.enqueue(ping_event("A1", "A2"));
    bus.enqueue(ping_event("A1", "A3"));

    let first = reader.recv().await.unwrap();
    let second = reader.recv().await.unwrap();
    assert_eq!(first.to_agent_id, "A2");
    assert_eq!(second.to_agent_id, "A3");
}

#[tokio::test]
async fn activity_counts_queued_events() {
    let (bus, mut reader) = EventBus::new();
    assert!(bus.activity().is_idle());

    bus.enqueue(ping_event("A1", "A2"));
    assert_eq!(bus.activity().in_flight(), 1);

    let _ = reader.recv().await.unwrap();
    // Receiving does not end the unit of work; processing completion does
    assert_eq!(bus.activity().in_flight(), 1);
    bus.activity().end();
    assert!(bus.activity().is_idle());
}

#[tokio::test]
async fn wait_idle_resolves_after_last_end() {
    let (bus, mut reader) = EventBus::new();
    bus.enqueue(ping_event("A1", "A2"));
    let _ = reader.recv().await;

    let activity = Arc::clone(bus.activity());
    let waiter = tokio::spawn(async move { activity.wait_idle().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    bus.activity().end();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn wait_idle_returns_immediately_when_idle() {
    let (bus, _reader) = EventBus::new();
    tokio::time::timeout(Duration::from_millis(100), bus.activity().wait_idle())
        .await
        .unwrap();
}

#[tokio::test]
async fn enqueue_after_reader_drop_does_not_leak_activity() {
    let (bus, reader) = EventBus::new();
    drop(reader);
    bus.enqueue(ping_event("A1", "A2"));
    assert!(bus.activity().is_idle());
}

#[tokio::test]
async fn stop_signal_latches_first_reason() {
    let signal = StopSignal::default();
    assert!(!signal.is_stopped());

    signal.trigger("max_steps");
    signal.trigger("later");
    assert!(signal.is_stopped());
    assert_eq!(signal.reason().as_deref(), Some("max_steps"));
}

#[tokio::test]
async fn stop_signal_wakes_waiters() {
    let signal = Arc::new(StopSignal::default());
    let waiter = {
        let signal = Arc::clone(&signal);
        tokio::spawn(async move { signal.wait().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    signal.trigger("stop_simulation");
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}
