// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use colony_core::test_support::decision;
use serde_json::json;

fn records() -> Vec<DecisionRecord> {
    let mut first = decision("t-1", "A1", 0).with_context(json!({"instruction": "vote"}));
    first.rating = Some(8.0);
    let second = decision("t-1", "A2", 1);
    vec![first, second]
}

#[test]
fn format_parse_accepts_known_names() {
    assert_eq!(ExportFormat::parse("json"), Some(ExportFormat::Json));
    assert_eq!(ExportFormat::parse("jsonl"), Some(ExportFormat::Jsonl));
    assert_eq!(ExportFormat::parse("csv"), Some(ExportFormat::Csv));
    assert_eq!(ExportFormat::parse("parquet"), None);
}

#[test]
fn json_export_is_an_array_with_iso_timestamps() {
    let bytes = export_training_data(&records(), ExportFormat::Json, true, 100).unwrap();
    let parsed: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed.len(), 2);
    // chrono serializes DateTime<Utc> as RFC 3339 / ISO-8601
    let timestamp = parsed[0]["timestamp"].as_str().unwrap();
    assert!(timestamp.contains('T'));
    assert_eq!(parsed[0]["context"]["instruction"], "vote");
}

#[test]
fn jsonl_export_roundtrips_to_same_records() {
    let original = records();
    let bytes = export_training_data(&original, ExportFormat::Jsonl, true, 100).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    let reparsed: Vec<DecisionRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reparsed, original);
}

#[test]
fn context_is_stripped_when_excluded() {
    let bytes = export_training_data(&records(), ExportFormat::Jsonl, false, 100).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(!text.contains("instruction"));
}

#[test]
fn limit_truncates_output() {
    let bytes = export_training_data(&records(), ExportFormat::Jsonl, true, 1).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[test]
fn csv_export_flattens_context_to_json_column() {
    let bytes = export_training_data(&records(), ExportFormat::Csv, true, 100).unwrap();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());

    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().last(), Some("context"));

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    let context_index = headers.iter().position(|h| h == "context").unwrap();
    let context: Value = serde_json::from_str(&rows[0][context_index]).unwrap();
    assert_eq!(context["instruction"], "vote");
    // Second record has no context
    assert_eq!(&rows[1][context_index], "");
}

#[test]
fn csv_export_without_context_omits_column() {
    let bytes = export_training_data(&records(), ExportFormat::Csv, false, 100).unwrap();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    assert!(!reader.headers().unwrap().iter().any(|h| h == "context"));
}

#[test]
fn empty_input_exports_cleanly() {
    let bytes = export_training_data(&[], ExportFormat::Json, true, 10).unwrap();
    assert_eq!(bytes, b"[]");
}
