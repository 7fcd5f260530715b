// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch processor for decision and event records.
//!
//! Buffers two streams in memory and flushes to the sink when either the
//! batch size or the oldest-item age threshold is reached. A high
//! watermark (4x batch size) forces an inline flush so a slow sink bounds
//! memory instead of growing it. Flushes are serialized; failed flushes
//! retain the batch and retry with backoff, decision records are never
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colony_core::decision::{DecisionRecord, EventRecord};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::sink::{DecisionSink, StoreError};

/// Flush thresholds.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_wait: Duration::from_secs(10),
        }
    }
}

/// Retry attempts for one flush before the batch is put back.
const FLUSH_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct Buffers {
    decisions: Vec<DecisionRecord>,
    events: Vec<EventRecord>,
    oldest: Option<Instant>,
}

impl Buffers {
    fn len(&self) -> usize {
        self.decisions.len() + self.events.len()
    }

    fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.events.is_empty()
    }
}

struct BatchInner {
    sink: Arc<dyn DecisionSink>,
    config: BatchConfig,
    buffers: Mutex<Buffers>,
    wake: Notify,
    stopped: AtomicBool,
    /// Serializes flushes so the sink never sees interleaved batches.
    flush_gate: tokio::sync::Mutex<()>,
}

/// Process-wide buffer between the runtime and the decision sink.
#[derive(Clone)]
pub struct BatchProcessor {
    inner: Arc<BatchInner>,
    flusher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BatchProcessor {
    /// Start the processor and its background flusher task.
    pub fn start(sink: Arc<dyn DecisionSink>, config: BatchConfig) -> Self {
        let inner = Arc::new(BatchInner {
            sink,
            config,
            buffers: Mutex::new(Buffers::default()),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            flush_gate: tokio::sync::Mutex::new(()),
        });

        let flusher_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            loop {
                let max_wait = flusher_inner.config.max_wait;
                tokio::select! {
                    _ = flusher_inner.wake.notified() => {}
                    _ = tokio::time::sleep(max_wait) => {}
                }
                if flusher_inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                if should_flush(&flusher_inner) {
                    if let Err(error) = flush_once(&flusher_inner).await {
                        error!(%error, "batch flush failed, batch retained");
                    }
                }
            }
        });

        Self {
            inner,
            flusher: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Append a decision record. Non-blocking unless the high watermark is
    /// hit, in which case the call flushes inline.
    pub async fn add_decision_record(&self, record: DecisionRecord) -> Result<(), StoreError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            // Stopped processors hand records straight to the sink so
            // nothing is lost during shutdown races.
            warn!("batch processor stopped, writing decision directly");
            return self.inner.sink.record_decisions(vec![record]).await;
        }
        let over_watermark = {
            let mut buffers = self.inner.buffers.lock();
            buffers.decisions.push(record);
            buffers.oldest.get_or_insert_with(Instant::now);
            buffers.len() >= self.inner.config.batch_size * 4
        };
        if over_watermark {
            flush_once(&self.inner).await?;
        } else if self.pending() >= self.inner.config.batch_size {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    /// Append an event record for durable storage.
    pub async fn add_storage_event(&self, record: EventRecord) -> Result<(), StoreError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return self.inner.sink.record_events(vec![record]).await;
        }
        let over_watermark = {
            let mut buffers = self.inner.buffers.lock();
            buffers.events.push(record);
            buffers.oldest.get_or_insert_with(Instant::now);
            buffers.len() >= self.inner.config.batch_size * 4
        };
        if over_watermark {
            flush_once(&self.inner).await?;
        } else if self.pending() >= self.inner.config.batch_size {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    /// Buffered item count.
    pub fn pending(&self) -> usize {
        self.inner.buffers.lock().len()
    }

    /// Flush whatever is buffered right now.
    pub async fn flush(&self) -> Result<(), StoreError> {
        flush_once(&self.inner).await
    }

    /// Flush remaining items, then disable. Records added after stop go
    /// straight to the sink.
    pub async fn stop(&self) -> Result<(), StoreError> {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "batch flusher task ended abnormally");
            }
        }

        let result = flush_once(&self.inner).await;
        debug!("batch processor stopped");
        result
    }
}

fn should_flush(inner: &BatchInner) -> bool {
    let buffers = inner.buffers.lock();
    if buffers.is_empty() {
        return false;
    }
    buffers.len() >= inner.config.batch_size
        || buffers
            .oldest
            .is_some_and(|t| t.elapsed() >= inner.config.max_wait)
}

/// Take the buffers and push them to the sink, retrying with backoff. On
/// exhausted retries the batch is put back for a later attempt.
async fn flush_once(inner: &Arc<BatchInner>) -> Result<(), StoreError> {
    let _gate = inner.flush_gate.lock().await;

    let (decisions, events) = {
        let mut buffers = inner.buffers.lock();
        if buffers.is_empty() {
            return Ok(());
        }
        buffers.oldest = None;
        (
            std::mem::take(&mut buffers.decisions),
            std::mem::take(&mut buffers.events),
        )
    };

    let mut backoff = Duration::from_millis(100);
    let mut last_error: Option<StoreError> = None;
    for attempt in 0..FLUSH_ATTEMPTS {
        let result = async {
            if !decisions.is_empty() {
                inner.sink.record_decisions(decisions.clone()).await?;
            }
            if !events.is_empty() {
                inner.sink.record_events(events.clone()).await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(
                    decisions = decisions.len(),
                    events = events.len(),
                    "batch flushed"
                );
                return Ok(());
            }
            Err(error) => {
                warn!(%error, attempt, "batch flush attempt failed");
                last_error = Some(error);
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }

    // Put the batch back at the front so ordering is preserved
    {
        let mut buffers = inner.buffers.lock();
        let mut restored = decisions;
        restored.append(&mut buffers.decisions);
        buffers.decisions = restored;
        let mut restored_events = events;
        restored_events.append(&mut buffers.events);
        buffers.events = restored_events;
        buffers.oldest.get_or_insert_with(Instant::now);
    }
    Err(last_error.unwrap_or(StoreError::Closed))
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
