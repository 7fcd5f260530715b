// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Training-data export.
//!
//! Decisions export as JSON, JSONL, or CSV. Timestamps are ISO-8601; the
//! CSV form flattens `context` to a JSON string column. A JSONL export
//! parses back into the same record set the query returned.

use colony_core::decision::DecisionRecord;
use serde_json::Value;

use crate::sink::StoreError;

/// Output format for [`export_training_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Jsonl,
    Csv,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            "jsonl" => Some(Self::Jsonl),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

const CSV_FIELDS: &[&str] = &[
    "decision_id",
    "trail_id",
    "universe_id",
    "agent_id",
    "agent_type",
    "step",
    "timestamp",
    "prompt",
    "output",
    "action",
    "rating",
    "feedback",
    "reason",
];

/// Render `records` (truncated to `limit`) in the requested format.
pub fn export_training_data(
    records: &[DecisionRecord],
    format: ExportFormat,
    include_context: bool,
    limit: usize,
) -> Result<Vec<u8>, StoreError> {
    let records = &records[..records.len().min(limit)];
    match format {
        ExportFormat::Json => {
            let values: Vec<Value> = records
                .iter()
                .map(|r| record_value(r, include_context))
                .collect::<Result<_, _>>()?;
            Ok(serde_json::to_vec(&values)?)
        }
        ExportFormat::Jsonl => {
            let mut out = Vec::new();
            for record in records {
                let value = record_value(record, include_context)?;
                out.extend_from_slice(serde_json::to_string(&value)?.as_bytes());
                out.push(b'\n');
            }
            Ok(out)
        }
        ExportFormat::Csv => export_csv(records, include_context),
    }
}

fn record_value(record: &DecisionRecord, include_context: bool) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(record)?;
    if !include_context {
        if let Value::Object(map) = &mut value {
            map.remove("context");
        }
    }
    Ok(value)
}

fn export_csv(records: &[DecisionRecord], include_context: bool) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = CSV_FIELDS.to_vec();
    if include_context {
        header.push("context");
    }
    writer
        .write_record(&header)
        .map_err(|e| StoreError::Csv(e.to_string()))?;

    for record in records {
        let mut row: Vec<String> = vec![
            record.decision_id.to_string(),
            record.trail_id.to_string(),
            record.universe_id.clone(),
            record.agent_id.to_string(),
            record.agent_type.clone(),
            record.step.to_string(),
            record.timestamp.to_rfc3339(),
            record.prompt.clone(),
            record.output.clone(),
            record.action.clone().unwrap_or_default(),
            record.rating.map(|r| r.to_string()).unwrap_or_default(),
            record.feedback.clone().unwrap_or_default(),
            record.reason.clone().unwrap_or_default(),
        ];
        if include_context {
            // Context flattens to one JSON string column
            let context = if record.context.is_null() {
                String::new()
            } else {
                serde_json::to_string(&record.context)?
            };
            row.push(context);
        }
        writer
            .write_record(&row)
            .map_err(|e| StoreError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.to_string()))
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
