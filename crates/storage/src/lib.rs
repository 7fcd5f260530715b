// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-storage: durable recording of decisions and events.
//!
//! The [`DecisionSink`] trait is the storage boundary; the bundled
//! [`JsonlDecisionStore`] implements it on an append-only JSONL log, the
//! [`BatchProcessor`] sits between the runtime and the sink, and
//! [`export_training_data`] renders stored decisions for fine-tuning.

pub mod batch;
pub mod export;
pub mod sink;
pub mod store;

pub use batch::{BatchConfig, BatchProcessor};
pub use export::{export_training_data, ExportFormat};
pub use sink::{DecisionSink, DisabledSink, StepRange, StoreError};
pub use store::JsonlDecisionStore;
