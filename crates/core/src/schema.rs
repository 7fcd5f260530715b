// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile schemas: per-agent-type field declarations.
//!
//! A schema file (`profile/schema/<agent_type>.json`) maps field names to
//! specs declaring type, default, sampling policy, and privacy. Field order
//! is preserved, prompts list fields in authoring order.

use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Float,
    #[default]
    Str,
    List,
}

/// How a field value is produced when profile data does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Use the declared default.
    #[default]
    Default,
    /// Sample from `range` (numeric) or `choices` (str/list).
    Random,
    /// Ask the LLM during scene load; falls back to the default when no
    /// model is configured.
    Llm,
}

/// Sample-size bounds for `list` fields sampled randomly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleSize {
    Exact(usize),
    Bounds(usize, usize),
}

/// Declaration of one profile field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub sampling: Sampling,
    /// Inclusive `[min, max]` for random int/float sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<SampleSize>,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldSpec {
    /// Sample a value per the spec's type and bounds. Misconfigured specs
    /// fall back to the declared default rather than failing the load.
    pub fn sample_random(&self) -> Value {
        let mut rng = rand::rng();
        match self.field_type {
            FieldType::Int => {
                let (min, max) = self.range.unwrap_or((0.0, 100.0));
                Value::from(rng.random_range(min as i64..=max as i64))
            }
            FieldType::Float => {
                let (min, max) = self.range.unwrap_or((0.0, 1.0));
                Value::from(rng.random_range(min..=max))
            }
            FieldType::Str => match &self.choices {
                Some(choices) if !choices.is_empty() => choices
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| self.default_value()),
                _ => self.default_value(),
            },
            FieldType::List => {
                let Some(choices) = self.choices.as_ref().filter(|c| !c.is_empty()) else {
                    return self.default_value();
                };
                let k = match &self.sample_size {
                    Some(SampleSize::Exact(n)) => (*n).min(choices.len()),
                    Some(SampleSize::Bounds(lo, hi)) => {
                        let hi = (*hi).min(choices.len());
                        let lo = (*lo).min(hi);
                        rng.random_range(lo..=hi)
                    }
                    None => rng.random_range(1..=choices.len()),
                };
                let sampled: Vec<Value> = choices.choose_multiple(&mut rng, k).cloned().collect();
                Value::Array(sampled)
            }
        }
    }

    /// The declared default, or null.
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// Ordered field declarations for one agent type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentSchema {
    pub fields: IndexMap<String, FieldSpec>,
}

impl AgentSchema {
    pub fn new(fields: IndexMap<String, FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn is_private(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|spec| spec.private)
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    /// Fields whose sampling policy is `llm`, with type and description,
    /// for building generation prompts.
    pub fn llm_sampled_fields(&self) -> Vec<(&str, &FieldSpec)> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.sampling == Sampling::Llm)
            .map(|(name, spec)| (name.as_str(), spec))
            .collect()
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
