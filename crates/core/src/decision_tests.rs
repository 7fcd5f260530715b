// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::ENV_ID;
use serde_json::json;

fn record() -> DecisionRecord {
    DecisionRecord::new(
        TrailId::new("trail-1"),
        MAIN_UNIVERSE,
        AgentId::new("A1"),
        "Voter",
        3,
    )
}

#[test]
fn new_record_generates_uuid_decision_id() {
    let a = record();
    let b = record();
    assert_ne!(a.decision_id, b.decision_id);
    assert_eq!(a.decision_id.as_str().len(), 36);
}

#[test]
fn builders_fill_fields() {
    let trigger = Event::start(ENV_ID, "A1", 3);
    let r = record()
        .triggered_by(trigger.event_id.clone())
        .with_exchange("prompt text", r#"{"answer": "x"}"#)
        .with_context(json!({"instruction": "vote"}))
        .with_action("cast_vote")
        .with_processing_time(1.25);

    assert_eq!(r.event_id, Some(trigger.event_id));
    assert_eq!(r.prompt, "prompt text");
    assert_eq!(r.output, r#"{"answer": "x"}"#);
    assert_eq!(r.context["instruction"], "vote");
    assert_eq!(r.action.as_deref(), Some("cast_vote"));
    assert!((r.processing_time - 1.25).abs() < f64::EPSILON);
}

#[test]
fn serde_roundtrip() {
    let r = record().with_exchange("p", "o");
    let json = serde_json::to_string(&r).unwrap();
    let parsed: DecisionRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, r);
}

#[test]
fn unset_scoring_fields_are_omitted() {
    let json = serde_json::to_string(&record()).unwrap();
    assert!(!json.contains("rating"));
    assert!(!json.contains("feedback"));
    assert!(!json.contains("reason"));
}

#[test]
fn universe_defaults_to_main_on_deserialize() {
    let json = r#"{
        "decision_id": "d-1",
        "trail_id": "t-1",
        "agent_id": "A1",
        "step": 0,
        "timestamp": "2026-01-10T00:00:00Z",
        "prompt": "p",
        "output": "o"
    }"#;
    let parsed: DecisionRecord = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.universe_id, MAIN_UNIVERSE);
}

#[test]
fn event_record_scopes_event_to_trail() {
    let event = Event::start(ENV_ID, "A1", 1);
    let record = EventRecord::new(TrailId::new("t-1"), MAIN_UNIVERSE, 1, event.clone());
    assert_eq!(record.step, 1);
    assert_eq!(record.event, event);

    let json = serde_json::to_string(&record).unwrap();
    let parsed: EventRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}
