// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decision-curation pipeline: verify, analyze, refine.
//!
//! Prepares recorded decisions for fine-tuning. Each stage fills one
//! scoring field and skips records that already carry it, so running the
//! pipeline twice over the same records changes nothing, immutable
//! fields are never touched.

use std::sync::Arc;

use colony_core::DecisionRecord;
use colony_models::{ChatModel, ChatRequest};
use serde_json::json;
use tracing::{debug, info};

use crate::error::EngineError;

/// Default quality threshold: records rated below it get analyzed and
/// refined.
pub const DEFAULT_THRESHOLD: f64 = 4.0;

/// Score every unrated record from 1 (unreliable) to 5 (highly reliable),
/// filling `rating`. Returns how many records were newly scored.
pub async fn verify_data(
    records: &mut [DecisionRecord],
    model: &Arc<dyn ChatModel>,
) -> Result<usize, EngineError> {
    let mut scored = 0;
    for record in records.iter_mut() {
        if record.rating.is_some() {
            continue;
        }
        let prompt = format!(
            "Please act as a data quality verifier. Evaluate the reliability of \
             the following decision record.\n\
             Score the reliability from 1 to 5, where:\n\
             - 1-2: very unreliable (false information, contradictions)\n\
             - 3: somewhat reliable (minor inaccuracies)\n\
             - 4-5: highly reliable (accurate, logically sound, helpful)\n\n\
             Data item: {}\n\n\
             Your response should be ONLY a single number between 1 and 5.",
            render_item(record),
        );
        let response = model.chat(ChatRequest::from_prompt(None, prompt)).await?;
        record.rating = Some(extract_score(&response.content));
        scored += 1;
    }
    info!(scored, total = records.len(), "verification pass complete");
    Ok(scored)
}

/// For records rated below `threshold` and not yet analyzed, fill
/// `reason` with the main issues. Returns how many were newly analyzed.
pub async fn analyze_reasons(
    records: &mut [DecisionRecord],
    threshold: f64,
    model: &Arc<dyn ChatModel>,
) -> Result<usize, EngineError> {
    let mut analyzed = 0;
    for record in records.iter_mut() {
        let low_quality = record.rating.is_some_and(|r| r < threshold);
        if !low_quality || record.reason.is_some() {
            continue;
        }
        let prompt = format!(
            "Identify 2-3 main issues with this data item that affect its \
             reliability:\n\nData item: {}\n\n\
             List only the key issues using short bullet points.",
            render_item(record),
        );
        let response = model.chat(ChatRequest::from_prompt(None, prompt)).await?;
        record.reason = Some(response.content.trim().to_string());
        analyzed += 1;
    }
    debug!(analyzed, "reason analysis complete");
    Ok(analyzed)
}

/// For analyzed records without feedback, fill `feedback` with an
/// improved output addressing the identified issues. Returns how many
/// were newly refined.
pub async fn refine_data(
    records: &mut [DecisionRecord],
    model: &Arc<dyn ChatModel>,
) -> Result<usize, EngineError> {
    let mut refined = 0;
    for record in records.iter_mut() {
        let Some(reason) = record.reason.clone() else {
            continue;
        };
        if record.feedback.is_some() {
            continue;
        }
        let prompt = format!(
            "Please improve the following data item based on the issues \
             identified below.\n\nOriginal data item:\n{}\n\n\
             Issues to fix: {reason}\n\n\
             Provide ONLY the improved output content, not the entire item.",
            render_item(record),
        );
        let response = model.chat(ChatRequest::from_prompt(None, prompt)).await?;
        record.feedback = Some(response.content.trim().to_string());
        refined += 1;
    }
    info!(refined, "refinement pass complete");
    Ok(refined)
}

/// Run the full verify → analyze → refine pipeline. Idempotent: a second
/// run over the same records is a no-op.
pub async fn run_pipeline(
    records: &mut [DecisionRecord],
    threshold: f64,
    model: &Arc<dyn ChatModel>,
) -> Result<(usize, usize, usize), EngineError> {
    let verified = verify_data(records, model).await?;
    let analyzed = analyze_reasons(records, threshold, model).await?;
    let refined = refine_data(records, model).await?;
    Ok((verified, analyzed, refined))
}

/// Prompt rendering of a record: the exchange without scoring fields
/// (avoids echoing a previous `reason` back at the model).
fn render_item(record: &DecisionRecord) -> String {
    serde_json::to_string_pretty(&json!({
        "agent_type": record.agent_type,
        "step": record.step,
        "context": record.context,
        "prompt": record.prompt,
        "output": record.output,
    }))
    .unwrap_or_default()
}

/// Parse a score out of free-form text: first integer found, clamped to
/// 1-5; unparseable responses default to 5 (benefit of the doubt).
fn extract_score(text: &str) -> f64 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<i64>() {
        Ok(score) => score.clamp(1, 5) as f64,
        Err(_) => 5.0,
    }
}

#[cfg(test)]
#[path = "refine_tests.rs"]
mod tests;
