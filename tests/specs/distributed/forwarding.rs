// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote event forwarding: master -> worker -> handler -> back to the
//! master's environment, over real TCP.

use colony_core::{AgentId, Event, ENV_ID};
use colony_engine::EventRouter;

use crate::prelude::{done_reply_hooks, wait_until, Cluster};

#[tokio::test]
async fn start_event_round_trips_through_the_worker() {
    let cluster = Cluster::start(1, 60, done_reply_hooks("TypeA"), "{}").await;
    let created = cluster.create_scored_agents("TypeA", &[0]).await;
    assert_eq!(created, 1);

    // The agent lives on the worker, not the master
    assert!(cluster.workers[0]
        .directory()
        .contains(&AgentId::new("TypeA0")));
    assert!(cluster.master.env().directory().is_empty());
    assert_eq!(
        cluster.master.placement_of(&AgentId::new("TypeA0")),
        Some(colony_net::WorkerId::new("w-0"))
    );

    // Master emits the start event; the worker's handler answers DoneEvent
    cluster
        .env
        .add_event(Event::start(ENV_ID, AgentId::new("TypeA0"), 0));

    // Exactly one DoneEvent comes back to the master's environment
    // (the batch processor writes on its own cadence, so poll)
    wait_until(|| cluster.stored_events("DoneEvent") >= 1).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(cluster.stored_events("DoneEvent"), 1);
}

#[tokio::test]
async fn events_to_unknown_agents_drop_with_a_warning() {
    let cluster = Cluster::start(1, 60, done_reply_hooks("TypeA"), "{}").await;

    cluster
        .env
        .add_event(Event::start(ENV_ID, AgentId::new("nobody"), 0));
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // Nothing came back and nothing crashed
    assert_eq!(cluster.stored_events("DoneEvent"), 0);
    assert!(!cluster.stop.is_stopped());
}

#[tokio::test]
async fn termination_reaches_the_workers() {
    let cluster = Cluster::start(2, 60, done_reply_hooks("TypeA"), "{}").await;
    cluster.create_scored_agents("TypeA", &[0, 1]).await;

    cluster.master.broadcast_terminate("trail over").await;

    for worker in &cluster.workers {
        wait_until(|| worker.stop_signal().is_stopped()).await;
        assert_eq!(
            worker.stop_signal().reason().as_deref(),
            Some("trail over")
        );
    }
}
