// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-data aggregation across workers: one by-type query returns every
//! agent's value regardless of which worker hosts it.

use colony_engine::EnvironmentLink;
use serde_json::json;

use crate::prelude::{done_reply_hooks, Cluster};

#[tokio::test]
async fn by_type_query_merges_both_workers_without_defaults() {
    let cluster = Cluster::start(2, 60, done_reply_hooks("T"), "{}").await;

    // Ten agents with scores 0..9, split across the two workers
    let scores: Vec<i64> = (0..10).collect();
    assert_eq!(cluster.create_scored_agents("T", &scores).await, 10);

    // Least-loaded placement splits them evenly
    assert_eq!(cluster.workers[0].directory().len(), 5);
    assert_eq!(cluster.workers[1].directory().len(), 5);

    let values = cluster
        .env
        .get_agent_data_by_type("T", "score", json!(-1))
        .await;

    assert_eq!(values.len(), 10);
    for (index, score) in scores.iter().enumerate() {
        let value = &values[&format!("T{index}")];
        assert_eq!(value, &json!(score), "score for T{index}");
        assert_ne!(value, &json!(-1), "no default placeholders expected");
    }
}

#[tokio::test]
async fn by_type_query_for_unknown_type_is_empty() {
    let cluster = Cluster::start(1, 60, done_reply_hooks("T"), "{}").await;
    cluster.create_scored_agents("T", &[1, 2]).await;

    let values = cluster
        .env
        .get_agent_data_by_type("Unknown", "score", json!(-1))
        .await;
    assert!(values.is_empty());
}

#[tokio::test]
async fn single_agent_reads_resolve_across_the_cluster() {
    let cluster = Cluster::start(2, 60, done_reply_hooks("T"), "{}").await;
    cluster.create_scored_agents("T", &[3, 8]).await;

    let value = cluster
        .env
        .get_agent_data(&colony_core::AgentId::new("T1"), "score", json!(-1))
        .await;
    assert_eq!(value, json!(8));

    // Unknown agents come back as the caller's default
    let value = cluster
        .env
        .get_agent_data(&colony_core::AgentId::new("T99"), "score", json!(-1))
        .await;
    assert_eq!(value, json!(-1));
}

#[tokio::test]
async fn workers_read_env_state_through_the_master() {
    let cluster = Cluster::start(1, 60, done_reply_hooks("T"), "{}").await;
    cluster.env.update_data("season", json!("winter")).await;

    let proxy = cluster.workers[0].proxy();
    assert_eq!(
        proxy.get_data("season", json!("none")).await,
        json!("winter")
    );

    // Writes surface success and are visible master-side
    assert!(proxy.update_data("season", json!("spring")).await);
    assert_eq!(
        cluster.env.get_data("season", json!("none")).await,
        json!("spring")
    );
}
