// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-node round scenario: two agents ping each other every round,
//! peers reply to the environment, the clock stops at max_steps.

use std::sync::Arc;

use colony_core::{Event, ENV_ID};
use colony_engine::HandlerFn;
use colony_models::ScriptedChatModel;
use colony_storage::DecisionSink;

use crate::prelude::World;

/// StartEvent handler: ask the model where to ping, drop self from the
/// returned targets, send one PingEvent per remaining peer.
fn start_handler() -> HandlerFn {
    Arc::new(|agent, event| {
        Box::pin(async move {
            let reaction = agent
                .generate_reaction(&event, "Pick agents to ping.", "A new round began.")
                .await?;
            let targets = agent.resolve_targets(reaction.get("target_ids"));
            let events = targets
                .into_iter()
                .filter(|target| target != agent.profile_id())
                .map(|target| {
                    Event::new(agent.profile_id().clone(), target, "PingEvent").caused_by(&event)
                })
                .collect();
            Ok(events)
        })
    })
}

/// PingEvent handler: reply PongEvent to the environment, no LLM call.
fn ping_handler() -> HandlerFn {
    Arc::new(|agent, event| {
        Box::pin(async move {
            Ok(vec![Event::new(
                agent.profile_id().clone(),
                ENV_ID,
                "PongEvent",
            )
            .caused_by(&event)])
        })
    })
}

#[tokio::test]
async fn two_agents_two_rounds_produce_four_pongs_and_four_decisions() {
    // Both agents get the full roster back; the handler drops self
    let scripted =
        ScriptedChatModel::always(r#"{"answer": "ping", "target_ids": ["A1", "A2"]}"#);
    let world = World::start(2, scripted);

    for id in ["A1", "A2"] {
        world.add_agent(
            "TypeA",
            id,
            &[
                ("StartEvent", "open_round", start_handler()),
                ("PingEvent", "answer_ping", ping_handler()),
            ],
        );
    }

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    // Round mode ran to quiescence twice and stopped at max_steps
    assert_eq!(world.env.round_number(), 2);
    assert_eq!(world.stop.reason().as_deref(), Some("max_steps"));

    // 2 agents x 2 rounds, one LLM decision per StartEvent
    assert_eq!(world.sink.decision_count().await.unwrap(), 4);
    let a1 = world.decisions_of("A1").await;
    assert_eq!(a1.len(), 2);
    // Every decision lands inside [0, max_steps)
    for decision in world
        .decisions_of("A1")
        .await
        .iter()
        .chain(world.decisions_of("A2").await.iter())
    {
        assert!(decision.step < 2);
    }

    // The environment observed 2 pongs per round
    assert_eq!(world.stored_events("PongEvent", "ENV"), 4);
}

#[tokio::test]
async fn empty_target_ids_is_not_an_error() {
    let scripted = ScriptedChatModel::always(r#"{"answer": "rest", "target_ids": []}"#);
    let world = World::start(1, scripted);
    world.add_agent("TypeA", "A1", &[("StartEvent", "open_round", start_handler())]);

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    assert_eq!(world.env.round_number(), 1);
    // The decision still recorded; no follow-up events were produced
    assert_eq!(world.sink.decision_count().await.unwrap(), 1);
    assert_eq!(world.stored_events("PingEvent", "A1"), 0);
}

#[tokio::test]
async fn unknown_target_ids_are_dropped() {
    let scripted =
        ScriptedChatModel::always(r#"{"answer": "ping", "target_ids": ["ghost", "A2"]}"#);
    let world = World::start(1, scripted);
    world.add_agent("TypeA", "A1", &[("StartEvent", "open_round", start_handler())]);
    world.add_agent("TypeA", "A2", &[("PingEvent", "answer_ping", ping_handler())]);

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    // Only the known peer was pinged; the unknown id dropped silently
    assert_eq!(world.stored_events("PingEvent", "A2"), 1);
    assert_eq!(world.stored_events("PingEvent", "ghost"), 0);
}

#[tokio::test]
async fn end_event_terminates_before_max_steps() {
    let scripted = ScriptedChatModel::always(r#"{"answer": "stop", "target_ids": []}"#);
    let world = World::start(1000, scripted);

    let end_handler: HandlerFn = Arc::new(|agent, event| {
        Box::pin(async move {
            Ok(vec![Event::end(agent.profile_id().clone(), "scenario done").caused_by(&event)])
        })
    });
    world.add_agent("TypeA", "A1", &[("StartEvent", "wrap_up", end_handler)]);

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    assert!(world.env.round_number() < 1000);
    assert_eq!(world.stop.reason().as_deref(), Some("scenario done"));
}
