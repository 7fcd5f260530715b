// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-processing pipeline idempotence over decisions from a real run.

use std::sync::Arc;

use colony_engine::refine::{analyze_reasons, refine_data, run_pipeline, verify_data};
use colony_engine::HandlerFn;
use colony_models::{ChatModel, ScriptedChatModel};

use crate::prelude::World;

fn deciding_handler() -> HandlerFn {
    Arc::new(|agent, event| {
        Box::pin(async move {
            agent
                .generate_reaction(&event, "Make a call.", "Observation.")
                .await?;
            Ok(vec![])
        })
    })
}

#[tokio::test]
async fn pipeline_over_run_output_is_idempotent() {
    let scripted = ScriptedChatModel::always(r#"{"answer": "weak", "target_ids": []}"#);
    let world = World::start(2, scripted);
    world.add_agent("TypeA", "A1", &[("StartEvent", "decide", deciding_handler())]);

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    let mut records = world.decisions_of("A1").await;
    assert_eq!(records.len(), 2);

    // A curation model that rates low, names issues, and rewrites
    let curator: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::new([
        "2",
        "2",
        "- answer is unsupported",
        "- answer is unsupported",
        "a grounded answer",
        "a grounded answer",
    ]));

    let (verified, analyzed, refined) = run_pipeline(&mut records, 4.0, &curator).await.unwrap();
    assert_eq!((verified, analyzed, refined), (2, 2, 2));
    for record in &records {
        assert_eq!(record.rating, Some(2.0));
        assert!(record.reason.is_some());
        assert!(record.feedback.is_some());
    }

    // Second run over the same inputs leaves every record unchanged
    let snapshot = records.clone();
    let (verified, analyzed, refined) = run_pipeline(&mut records, 4.0, &curator).await.unwrap();
    assert_eq!((verified, analyzed, refined), (0, 0, 0));
    assert_eq!(records, snapshot);
}

#[tokio::test]
async fn high_rated_records_skip_analysis_and_refinement() {
    let scripted = ScriptedChatModel::always(r#"{"answer": "solid", "target_ids": []}"#);
    let world = World::start(1, scripted);
    world.add_agent("TypeA", "A1", &[("StartEvent", "decide", deciding_handler())]);

    tokio::time::timeout(std::time::Duration::from_secs(10), world.env.run())
        .await
        .unwrap();

    let mut records = world.decisions_of("A1").await;
    let curator: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::always("5"));

    verify_data(&mut records, &curator).await.unwrap();
    assert_eq!(records[0].rating, Some(5.0));

    assert_eq!(analyze_reasons(&mut records, 4.0, &curator).await.unwrap(), 0);
    assert_eq!(refine_data(&mut records, &curator).await.unwrap(), 0);
    assert!(records[0].reason.is_none());
    assert!(records[0].feedback.is_none());
}
