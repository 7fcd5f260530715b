// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use colony_core::test_support::decision;
use colony_models::ScriptedChatModel;
use yare::parameterized;

fn model(responses: &[&str]) -> (Arc<dyn ChatModel>, ScriptedChatModel) {
    let scripted = ScriptedChatModel::new(responses.iter().copied());
    (Arc::new(scripted.clone()), scripted)
}

#[parameterized(
    bare_number = { "3", 3.0 },
    with_prose = { "I would score this 2 out of 5", 2.0 },
    clamped_high = { "10", 5.0 },
    clamped_low = { "0", 1.0 },
    unparseable = { "excellent", 5.0 },
)]
fn score_extraction(text: &str, expected: f64) {
    assert!((extract_score(text) - expected).abs() < f64::EPSILON);
}

#[tokio::test]
async fn verify_scores_unrated_records_only() {
    let (model, scripted) = model(&["2"]);
    let mut records = vec![decision("t-1", "A1", 0), decision("t-1", "A2", 0)];
    records[1].rating = Some(5.0);

    let scored = verify_data(&mut records, &model).await.unwrap();
    assert_eq!(scored, 1);
    assert_eq!(records[0].rating, Some(2.0));
    assert_eq!(records[1].rating, Some(5.0));
    assert_eq!(scripted.call_count(), 1);
}

#[tokio::test]
async fn analyze_targets_low_rated_without_reason() {
    let (model, scripted) = model(&["- output ignores the instruction"]);
    let mut records = vec![
        decision("t-1", "A1", 0),
        decision("t-1", "A2", 0),
        decision("t-1", "A3", 0),
    ];
    records[0].rating = Some(2.0);
    records[1].rating = Some(5.0);
    records[2].rating = Some(1.0);
    records[2].reason = Some("already analyzed".to_string());

    let analyzed = analyze_reasons(&mut records, DEFAULT_THRESHOLD, &model)
        .await
        .unwrap();
    assert_eq!(analyzed, 1);
    assert!(records[0].reason.as_deref().unwrap().contains("ignores"));
    assert!(records[1].reason.is_none());
    assert_eq!(records[2].reason.as_deref(), Some("already analyzed"));
    assert_eq!(scripted.call_count(), 1);
}

#[tokio::test]
async fn refine_fills_feedback_for_analyzed_records() {
    let (model, _) = model(&["an improved, grounded answer"]);
    let mut records = vec![decision("t-1", "A1", 0), decision("t-1", "A2", 0)];
    records[0].rating = Some(2.0);
    records[0].reason = Some("too vague".to_string());

    let refined = refine_data(&mut records, &model).await.unwrap();
    assert_eq!(refined, 1);
    assert_eq!(
        records[0].feedback.as_deref(),
        Some("an improved, grounded answer")
    );
    assert!(records[1].feedback.is_none());
}

#[tokio::test]
async fn pipeline_is_idempotent_on_second_run() {
    let (model, scripted) = model(&["2", "- weak evidence", "a better answer"]);
    let mut records = vec![decision("t-1", "A1", 0)];

    let (verified, analyzed, refined) = run_pipeline(&mut records, DEFAULT_THRESHOLD, &model)
        .await
        .unwrap();
    assert_eq!((verified, analyzed, refined), (1, 1, 1));
    let snapshot = records.clone();
    let calls_after_first = scripted.call_count();

    // Second run: every stage skips, nothing changes, no LLM calls
    let (verified, analyzed, refined) = run_pipeline(&mut records, DEFAULT_THRESHOLD, &model)
        .await
        .unwrap();
    assert_eq!((verified, analyzed, refined), (0, 0, 0));
    assert_eq!(records, snapshot);
    assert_eq!(scripted.call_count(), calls_after_first);
}

#[tokio::test]
async fn immutable_fields_survive_the_pipeline() {
    let (model, _) = model(&["1", "- fabricated claim", "corrected output"]);
    let mut records = vec![decision("t-1", "A1", 3)];
    let original = records[0].clone();

    run_pipeline(&mut records, DEFAULT_THRESHOLD, &model)
        .await
        .unwrap();

    assert_eq!(records[0].decision_id, original.decision_id);
    assert_eq!(records[0].prompt, original.prompt);
    assert_eq!(records[0].output, original.output);
    assert_eq!(records[0].step, original.step);
    assert_eq!(records[0].timestamp, original.timestamp);
}
