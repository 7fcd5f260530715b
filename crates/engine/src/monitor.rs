// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric monitor.
//!
//! Samples the metric specs declared in the scene manifest on their
//! intervals, keeps the latest sample per metric in memory, and appends
//! every sample to a JSONL file for external tooling. No rendering here -
//! dashboards are someone else's problem.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colony_core::{MetricSpec, MonitorConfig, VariableSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::StopSignal;
use crate::env::EnvironmentLink;

/// One sampled observation of a metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_id: String,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub values: Map<String, Value>,
}

/// Periodic sampler over the scene's metric specs.
pub struct MonitorManager {
    env: Arc<dyn EnvironmentLink>,
    metrics: Vec<MetricSpec>,
    default_interval: Duration,
    metrics_path: Option<PathBuf>,
    latest: Arc<Mutex<HashMap<String, MetricSample>>>,
    stop: Arc<StopSignal>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorManager {
    pub fn new(
        config: &MonitorConfig,
        metrics: Vec<MetricSpec>,
        env: Arc<dyn EnvironmentLink>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            env,
            metrics,
            default_interval: Duration::from_secs(config.update_interval.max(1)),
            metrics_path: config.metrics_path.clone(),
            latest: Arc::new(Mutex::new(HashMap::new())),
            stop,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one sampling task per metric. Tasks exit on the stop signal.
    pub fn start(&self) {
        for metric in self.metrics.clone() {
            let env = Arc::clone(&self.env);
            let latest = Arc::clone(&self.latest);
            let stop = Arc::clone(&self.stop);
            let path = self.metrics_path.clone();
            let interval = if metric.update_interval > 0 {
                Duration::from_secs(metric.update_interval)
            } else {
                self.default_interval
            };

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = stop.wait() => break,
                    }
                    let sample = sample_metric(&metric, &env).await;
                    if let Some(path) = &path {
                        append_sample(path, &sample);
                    }
                    latest.lock().insert(metric.key().to_string(), sample);
                }
                debug!(metric = metric.key(), "metric sampler stopped");
            });
            self.tasks.lock().push(handle);
        }
    }

    /// Latest sample for a metric, if any has been taken.
    pub fn latest(&self, metric_id: &str) -> Option<MetricSample> {
        self.latest.lock().get(metric_id).cloned()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }
}

/// Resolve every variable of the metric against the environment.
async fn sample_metric(metric: &MetricSpec, env: &Arc<dyn EnvironmentLink>) -> MetricSample {
    let mut values = Map::new();
    for variable in &metric.variables {
        let value = match variable.source_type {
            VariableSource::Env => env.get_data(&variable.path, Value::Null).await,
            VariableSource::Agent => {
                let agent_type = variable.agent_type.as_deref().unwrap_or_default();
                let by_agent = env
                    .get_agent_data_by_type(agent_type, &variable.path, Value::Null)
                    .await;
                Value::Object(by_agent.into_iter().collect())
            }
        };
        if variable.required && value.is_null() {
            debug!(
                metric = metric.key(),
                variable = %variable.name,
                "required variable resolved to null"
            );
        }
        values.insert(variable.name.clone(), value);
    }

    MetricSample {
        metric_id: metric.key().to_string(),
        step: env.current_step(),
        timestamp: Utc::now(),
        values,
    }
}

fn append_sample(path: &std::path::Path, sample: &MetricSample) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(sample).unwrap_or_default();
        writeln!(file, "{line}")
    })();
    if let Err(error) = result {
        warn!(path = %path.display(), %error, "failed to append metric sample");
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
