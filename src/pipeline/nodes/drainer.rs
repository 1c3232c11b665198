//! Drainer node: cycles over its assigned sinks and empties any that are full.

use crate::pipeline::bridge::{EventPublisher, MachineEvent};
use crate::pipeline::id::DrainerId;
use crate::pipeline::sink::Sink;
use crate::pipeline::sync::{lock, CancellationToken};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Post-run figures for one drainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainerStats {
    pub id: DrainerId,
    /// Sinks emptied.
    pub drains: u64,
    /// Items removed across all drains.
    pub discharged: u64,
}

/// Read-only view of a drainer that outlives its thread.
#[derive(Clone)]
pub struct DrainerHandle {
    stats: Arc<Mutex<DrainerStats>>,
}

impl DrainerHandle {
    pub fn stats(&self) -> DrainerStats {
        *lock(&self.stats)
    }
}

pub struct Drainer {
    id: DrainerId,
    sinks: Vec<Arc<Sink>>,
    /// How long to wait on each sink before moving to the next.
    wait: Duration,
    stats: Arc<Mutex<DrainerStats>>,
    events: EventPublisher,
}

impl Drainer {
    pub fn new(id: DrainerId, sinks: Vec<Arc<Sink>>, wait: Duration, events: EventPublisher) -> Self {
        Self {
            id,
            sinks,
            wait,
            stats: Arc::new(Mutex::new(DrainerStats {
                id,
                drains: 0,
                discharged: 0,
            })),
            events,
        }
    }

    pub fn id(&self) -> DrainerId {
        self.id
    }

    pub fn handle(&self) -> DrainerHandle {
        DrainerHandle {
            stats: Arc::clone(&self.stats),
        }
    }

    /// Cycle over the assigned sinks until `cancel` fires.
    pub fn run(self, cancel: CancellationToken) -> DrainerStats {
        tracing::info!("{} started with {} sinks", self.id, self.sinks.len());

        if self.sinks.is_empty() {
            cancel.wait();
        }

        'cycle: while !cancel.is_cancelled() {
            for sink in &self.sinks {
                if cancel.is_cancelled() {
                    break 'cycle;
                }
                match sink.drain_when_full(self.wait, &cancel) {
                    Ok(0) => {}
                    Ok(items) => {
                        {
                            let mut stats = lock(&self.stats);
                            stats.drains += 1;
                            stats.discharged += items as u64;
                        }
                        tracing::info!("{} emptied {} ({} items)", self.id, sink.id(), items);
                        self.events.publish(MachineEvent::SinkDrained {
                            drainer: self.id,
                            sink: sink.id(),
                            items,
                        });
                    }
                    Err(_) => {
                        tracing::debug!("{} was stopped while waiting on {}", self.id, sink.id());
                        break 'cycle;
                    }
                }
            }
        }

        let stats = self.handle().stats();
        tracing::info!(
            "{} stopped after {} drains ({} items)",
            self.id,
            stats.drains,
            stats.discharged
        );
        stats
    }
}
