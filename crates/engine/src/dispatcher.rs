// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: single cooperative consumer of the event bus.
//!
//! Routing per event: `ENV` targets go to the environment link, locally
//! hosted agents get per-agent FIFO delivery (fairness across agents
//! comes from the scheduler), anything else goes to the distribution
//! router or is dropped with a warning. Handler concurrency is capped by
//! a global semaphore so a wide round cannot saturate the LLM backend.

use std::collections::HashMap;
use std::sync::Arc;

use colony_core::decision::EventRecord;
use colony_core::event::AgentId;
use colony_core::Event;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{Activity, BusReader, EventBus, StopSignal};
use crate::env::{AgentDirectory, EnvironmentLink, EventRouter};

/// Default cap on concurrently running handlers.
pub const DEFAULT_HANDLER_CONCURRENCY: usize = 32;

/// Routes events from the bus to their targets.
pub struct Dispatcher {
    bus: EventBus,
    env: Arc<dyn EnvironmentLink>,
    directory: Arc<AgentDirectory>,
    router: Option<Arc<dyn EventRouter>>,
    stop: Arc<StopSignal>,
    semaphore: Arc<Semaphore>,
    /// Per-agent delivery queues (FIFO per target).
    lanes: Mutex<HashMap<AgentId, mpsc::UnboundedSender<Event>>>,
    /// Record dispatched events durably (on by default).
    record_events: bool,
}

impl Dispatcher {
    pub fn new(
        bus: EventBus,
        env: Arc<dyn EnvironmentLink>,
        directory: Arc<AgentDirectory>,
        router: Option<Arc<dyn EventRouter>>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            bus,
            env,
            directory,
            router,
            stop,
            semaphore: Arc::new(Semaphore::new(DEFAULT_HANDLER_CONCURRENCY)),
            lanes: Mutex::new(HashMap::new()),
            record_events: true,
        }
    }

    pub fn with_handler_concurrency(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Consume the bus until the stop signal fires.
    pub fn spawn(self: Arc<Self>, mut reader: BusReader) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = reader.recv() => event,
                    _ = self.stop.wait() => None,
                };
                let Some(event) = event else { break };
                self.deliver(event).await;
            }
            debug!("dispatcher stopped");
        })
    }

    async fn deliver(self: &Arc<Self>, event: Event) {
        if self.record_events {
            let record = EventRecord::new(
                self.env.trail_id(),
                self.env.universe_id(),
                self.env.current_step(),
                event.clone(),
            );
            self.env.queue_event(record).await;
        }

        if event.is_to_env() || event.to_agent_id == self.env.env_id() {
            let follow_ups = self.env.handle_env_event(event).await;
            for follow_up in follow_ups {
                self.bus.enqueue(follow_up);
            }
            self.bus.activity().end();
            return;
        }

        let target = event.to_agent_id.clone();
        if self.directory.contains(&target) {
            self.deliver_local(target, event);
            return;
        }

        if let Some(router) = &self.router {
            let forwarded = router.forward(event).await;
            if !forwarded {
                debug!(agent_id = %target, "remote delivery dropped");
            }
            self.bus.activity().end();
            return;
        }

        warn!(
            agent_id = %target,
            "event for unknown agent dropped"
        );
        self.bus.activity().end();
    }

    /// Push onto the target's lane, spawning its delivery task on first
    /// use. Lane order gives per-target FIFO.
    fn deliver_local(self: &Arc<Self>, target: AgentId, event: Event) {
        let mut lanes = self.lanes.lock();
        let sender = lanes.entry(target.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.spawn_lane(target.clone(), rx);
            tx
        });
        if sender.send(event).is_err() {
            warn!(agent_id = %target, "agent lane closed, event dropped");
            self.bus.activity().end();
        }
    }

    fn spawn_lane(self: &Arc<Self>, agent_id: AgentId, mut rx: mpsc::UnboundedReceiver<Event>) {
        let directory = Arc::clone(&self.directory);
        let bus = self.bus.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let activity: Arc<Activity> = Arc::clone(bus.activity());
        let stop = Arc::clone(&self.stop);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if stop.is_stopped() {
                    activity.end();
                    continue;
                }
                let Some(agent) = directory.get(&agent_id) else {
                    // Agent was removed mid-run (worker reassignment)
                    warn!(agent_id = %agent_id, "agent gone, event dropped");
                    activity.end();
                    continue;
                };

                let Ok(permit) = semaphore.acquire().await else {
                    activity.end();
                    break;
                };
                let follow_ups = agent.handle_event(event).await;
                drop(permit);

                for follow_up in follow_ups {
                    bus.enqueue(follow_up);
                }
                activity.end();
            }
        });
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
