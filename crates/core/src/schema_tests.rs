// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn parse_schema(json: &str) -> AgentSchema {
    serde_json::from_str(json).unwrap()
}

#[test]
fn schema_parses_field_specs() {
    let schema = parse_schema(
        r#"{
            "name": {"type": "str", "default": "Ada", "sampling": "llm", "description": "Given name"},
            "age": {"type": "int", "sampling": "random", "range": [18, 65]},
            "savings": {"type": "float", "default": 100.0, "private": true},
            "interests": {"type": "list", "sampling": "random", "choices": ["a", "b", "c"], "sample_size": 2}
        }"#,
    );

    assert_eq!(schema.fields.len(), 4);
    assert_eq!(schema.get("name").unwrap().sampling, Sampling::Llm);
    assert_eq!(schema.get("age").unwrap().field_type, FieldType::Int);
    assert!(schema.is_private("savings"));
    assert!(!schema.is_private("name"));
    assert!(!schema.is_private("unknown"));
}

#[test]
fn schema_preserves_field_order() {
    let schema = parse_schema(r#"{"z": {}, "a": {}, "m": {}}"#);
    let names: Vec<&String> = schema.fields.keys().collect();
    assert_eq!(names, ["z", "a", "m"]);
}

#[test]
fn random_int_sampling_respects_range() {
    let spec = FieldSpec {
        field_type: FieldType::Int,
        sampling: Sampling::Random,
        range: Some((3.0, 7.0)),
        ..FieldSpec::default()
    };
    for _ in 0..50 {
        let value = spec.sample_random();
        let n = value.as_i64().unwrap();
        assert!((3..=7).contains(&n), "sampled {n} out of range");
    }
}

#[test]
fn random_float_sampling_respects_range() {
    let spec = FieldSpec {
        field_type: FieldType::Float,
        sampling: Sampling::Random,
        range: Some((0.0, 1.0)),
        ..FieldSpec::default()
    };
    for _ in 0..50 {
        let value = spec.sample_random().as_f64().unwrap();
        assert!((0.0..=1.0).contains(&value));
    }
}

#[test]
fn random_str_sampling_picks_a_choice() {
    let spec = FieldSpec {
        field_type: FieldType::Str,
        sampling: Sampling::Random,
        choices: Some(vec![json!("S"), json!("I"), json!("R")]),
        ..FieldSpec::default()
    };
    for _ in 0..20 {
        let value = spec.sample_random();
        assert!(["S", "I", "R"].contains(&value.as_str().unwrap()));
    }
}

#[test]
fn random_list_sampling_respects_exact_size() {
    let spec = FieldSpec {
        field_type: FieldType::List,
        sampling: Sampling::Random,
        choices: Some(vec![json!(1), json!(2), json!(3), json!(4)]),
        sample_size: Some(SampleSize::Exact(2)),
        ..FieldSpec::default()
    };
    let value = spec.sample_random();
    assert_eq!(value.as_array().unwrap().len(), 2);
}

#[test]
fn random_sampling_without_choices_falls_back_to_default() {
    let spec = FieldSpec {
        field_type: FieldType::Str,
        sampling: Sampling::Random,
        default: Some(json!("fallback")),
        ..FieldSpec::default()
    };
    assert_eq!(spec.sample_random(), json!("fallback"));
}

#[test]
fn llm_sampled_fields_filters_by_policy() {
    let schema = parse_schema(
        r#"{
            "bio": {"type": "str", "sampling": "llm"},
            "age": {"type": "int", "sampling": "random"},
            "motto": {"type": "str", "sampling": "llm"}
        }"#,
    );
    let llm_fields: Vec<&str> = schema
        .llm_sampled_fields()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(llm_fields, ["bio", "motto"]);
}
