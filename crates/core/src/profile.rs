// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent profile state: public/private fields split by schema privacy.
//!
//! Profiles are shared across concurrent handler executions, so every read
//! and write goes through the profile's lock. `update_if` is the
//! test-and-set primitive for concurrent writes to the same key.

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::event::AgentId;
use crate::schema::{AgentSchema, Sampling};

/// Field storage split into public and private halves.
#[derive(Debug, Default, Clone)]
struct ProfileFields {
    public: Map<String, Value>,
    private: Map<String, Value>,
}

impl ProfileFields {
    fn get(&self, key: &str) -> Option<&Value> {
        self.public.get(key).or_else(|| self.private.get(key))
    }
}

/// Thread-safe agent profile.
///
/// The profile id is assigned exactly once, at construction, and is unique
/// within a trail (the scene loader enforces uniqueness).
#[derive(Debug)]
pub struct AgentProfile {
    agent_type: String,
    profile_id: AgentId,
    schema: AgentSchema,
    fields: Mutex<ProfileFields>,
}

impl AgentProfile {
    /// Build a profile from schema declarations plus optional per-instance
    /// data. Schema fields missing from `data` take their sampled or default
    /// value; extra `data` keys land in the public set.
    pub fn new(
        agent_type: impl Into<String>,
        profile_id: AgentId,
        schema: AgentSchema,
        data: Option<Map<String, Value>>,
    ) -> Self {
        let agent_type = agent_type.into();
        let mut fields = ProfileFields::default();
        fields
            .public
            .insert("agent_type".to_string(), Value::from(agent_type.clone()));

        let data = data.unwrap_or_default();
        for (name, spec) in &schema.fields {
            let value = match data.get(name) {
                Some(value) => value.clone(),
                None => match spec.sampling {
                    Sampling::Random => spec.sample_random(),
                    // LLM-sampled fields are filled by the scene loader when
                    // a model is available; default until then.
                    Sampling::Default | Sampling::Llm => spec.default_value(),
                },
            };
            if spec.private {
                fields.private.insert(name.clone(), value);
            } else {
                fields.public.insert(name.clone(), value);
            }
        }
        for (name, value) in data {
            if !schema.fields.contains_key(&name) && name != "agent_type" {
                fields.public.insert(name, value);
            }
        }

        Self {
            agent_type,
            profile_id,
            schema,
            fields: Mutex::new(fields),
        }
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn profile_id(&self) -> &AgentId {
        &self.profile_id
    }

    pub fn schema(&self) -> &AgentSchema {
        &self.schema
    }

    /// Read a field, descending dotted paths (`"a.b.0.c"`). Integer
    /// segments index into lists. Any miss or null along the path returns
    /// the supplied default; never panics.
    pub fn get_data(&self, key: &str, default: Value) -> Value {
        let mut parts = key.split('.');
        let Some(head) = parts.next() else {
            return default;
        };

        let fields = self.fields.lock();
        let Some(mut current) = fields.get(head) else {
            return default;
        };
        if current.is_null() {
            return default;
        }

        for part in parts {
            let next = match current {
                Value::Object(map) => map.get(part),
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) if !value.is_null() => current = value,
                _ => return default,
            }
        }
        current.clone()
    }

    /// Write a field, last-writer-wins. Keys already present keep their
    /// privacy side; new keys are public.
    pub fn update_data(&self, key: &str, value: Value) {
        let mut fields = self.fields.lock();
        if fields.private.contains_key(key) {
            fields.private.insert(key.to_string(), value);
        } else {
            fields.public.insert(key.to_string(), value);
        }
    }

    /// Atomic test-and-set: apply `update` only when `predicate` holds for
    /// the current value, all under the profile lock. Returns the applied
    /// flag and the value now stored under `key`.
    pub fn update_if(
        &self,
        key: &str,
        predicate: impl FnOnce(&Value) -> bool,
        update: impl FnOnce(&Value) -> Value,
    ) -> (bool, Value) {
        let mut fields = self.fields.lock();
        let current = fields.get(key).cloned().unwrap_or(Value::Null);
        if predicate(&current) {
            let next = update(&current);
            if fields.private.contains_key(key) {
                fields.private.insert(key.to_string(), next.clone());
            } else {
                fields.public.insert(key.to_string(), next.clone());
            }
            (true, next)
        } else {
            (false, current)
        }
    }

    /// Snapshot of the public fields (used for relationship caches and
    /// by-type queries).
    pub fn public_snapshot(&self) -> Map<String, Value> {
        self.fields.lock().public.clone()
    }

    /// JSON rendering for prompt building, truncated to 4096 characters.
    pub fn profile_str(&self, include_private: bool) -> String {
        let rendered = {
            let fields = self.fields.lock();
            let mut merged = fields.public.clone();
            if include_private {
                for (key, value) in &fields.private {
                    merged.insert(key.clone(), value.clone());
                }
            }
            serde_json::to_string_pretty(&Value::Object(merged)).unwrap_or_default()
        };
        match rendered.char_indices().nth(4096) {
            Some((cut, _)) => rendered[..cut].to_string(),
            None => rendered,
        }
    }

    /// Full field export (public and private merged, without the implicit
    /// `agent_type`), used to ship a profile to its hosting worker. The
    /// schema re-splits the halves on rebuild.
    pub fn export_data(&self) -> Map<String, Value> {
        let fields = self.fields.lock();
        let mut merged = fields.public.clone();
        merged.remove("agent_type");
        for (key, value) in &fields.private {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Overwrite a schema field with an LLM-generated value, respecting the
    /// declared privacy side. Used by the scene loader for `llm` sampling.
    pub fn apply_generated(&self, key: &str, value: Value) {
        let mut fields = self.fields.lock();
        if self.schema.is_private(key) {
            fields.private.insert(key.to_string(), value);
        } else {
            fields.public.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
