// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus.
//!
//! A single unbounded queue with one cooperative consumer (the
//! dispatcher). `enqueue` never blocks and never drops; per-producer FIFO
//! comes from the underlying channel. The [`Activity`] tracker counts
//! queued events plus running handlers so the environment can detect
//! quiescence (round completion).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use colony_core::Event;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Counts in-flight work: queued events + running handlers.
#[derive(Debug, Default)]
pub struct Activity {
    count: AtomicI64,
    idle: Notify,
}

impl Activity {
    /// One more unit of pending work (an event entering the bus).
    pub fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// One unit of work fully processed (handler returned, follow-ups
    /// already enqueued).
    pub fn end(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn in_flight(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() <= 0
    }

    /// Resolve when no work is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// Latched stop signal shared by the environment and the dispatcher.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
    reason: parking_lot::Mutex<Option<String>>,
}

impl StopSignal {
    /// Latch the signal. The first reason wins; later calls are no-ops.
    pub fn trigger(&self, reason: &str) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.reason.lock() = Some(reason.to_string());
        debug!(reason, "stop signal triggered");
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Resolve once the signal is triggered.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Producer half of the bus. Clone-cheap.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
    activity: Arc<Activity>,
}

/// Consumer half; owned by the dispatcher.
pub struct BusReader {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventBus {
    pub fn new() -> (Self, BusReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                activity: Arc::new(Activity::default()),
            },
            BusReader { rx },
        )
    }

    /// Non-blocking append. Never drops while the reader lives.
    pub fn enqueue(&self, event: Event) {
        self.activity.begin();
        if let Err(error) = self.tx.send(event) {
            // Reader gone, shutdown already in progress
            self.activity.end();
            warn!(event = %error.0.log_summary(), "bus closed, event dropped");
        }
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }
}

impl BusReader {
    /// Next event, or `None` when every producer has dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
