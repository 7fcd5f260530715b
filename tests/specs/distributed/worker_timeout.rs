// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker timeout recovery: a silent worker is removed, its agents become
//! unavailable, and the surviving worker keeps receiving events.

use colony_core::{AgentId, Event, ENV_ID};
use colony_engine::EventRouter;
use colony_net::WorkerId;

use crate::prelude::{done_reply_hooks, wait_until, Cluster};

#[tokio::test]
async fn silent_worker_is_removed_and_its_agents_drop() {
    // 1-second worker timeout, 1-second heartbeat
    let cluster = Cluster::start(2, 1, done_reply_hooks("TypeA"), "{}").await;
    cluster.create_scored_agents("TypeA", &[0, 1]).await;

    let w0_agents: Vec<AgentId> = cluster.workers[0].directory().ids();
    let w1_agents: Vec<AgentId> = cluster.workers[1].directory().ids();
    assert_eq!(w0_agents.len(), 1);
    assert_eq!(w1_agents.len(), 1);

    // Kill w-0's heartbeat (and its endpoint) without telling the master
    cluster.workers[0].stop_signal().trigger("simulated crash");

    // The master's health scan drops it after the timeout
    wait_until(|| cluster.master.check_workers_health().contains(&WorkerId::new("w-0")))
        .await;
    assert!(cluster.master.placement_of(&w0_agents[0]).is_none());

    // Events to the dead worker's agent drop with a warning
    let dropped = cluster
        .master
        .forward(Event::start(ENV_ID, w0_agents[0].clone(), 0))
        .await;
    assert!(!dropped);

    // Events to the surviving worker keep flowing
    cluster
        .env
        .add_event(Event::start(ENV_ID, w1_agents[0].clone(), 0));
    wait_until(|| cluster.stored_events("DoneEvent") >= 1).await;
}

#[tokio::test]
async fn heartbeats_keep_workers_registered() {
    let cluster = Cluster::start(1, 2, done_reply_hooks("TypeA"), "{}").await;

    // Well past the timeout: the 1s heartbeat loop keeps w-0 alive
    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    assert!(cluster.master.check_workers_health().is_empty());
    assert_eq!(cluster.master.worker_count(), 1);
}
