//! Thread boundary between the running machine and whoever is watching it.
//!
//! The machine and its drainers publish [`MachineEvent`]s through an
//! [`EventPublisher`]; an observer holds the matching [`MachineObserver`].
//! Publishing never blocks a worker: when the channel is full the event is
//! dropped and counted.

use crate::pipeline::id::{DrainerId, SinkId};
use crate::types::ProgressSnapshot;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Channel capacity for machine events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Messages published while a machine runs.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// All worker threads have been spawned.
    Started {
        producers: usize,
        routers: usize,
        drainers: usize,
    },

    /// Periodic aggregate sample.
    Progress(ProgressSnapshot),

    /// A drainer emptied a full sink.
    SinkDrained {
        drainer: DrainerId,
        sink: SinkId,
        items: usize,
    },

    /// Producers were told to stop after the configured duration.
    InputStopped { elapsed: Duration },

    /// Every item that left a producer reached a sink, or the drain wait gave up.
    Drained { elapsed: Duration, complete: bool },

    /// A router hit a fatal defect.
    Fault(String),

    /// All threads have joined.
    Shutdown { elapsed: Duration },
}

/// Worker-side handle for publishing events.
#[derive(Clone, Default)]
pub struct EventPublisher {
    tx: Option<Sender<MachineEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// A publisher that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Publish without blocking.
    pub fn publish(&self, event: MachineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Observer went away; nothing left to tell.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Number of events dropped because the observer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Observer-side handle.
pub struct MachineObserver {
    pub rx: Receiver<MachineEvent>,
}

impl MachineObserver {
    /// Drain all pending events.
    pub fn drain(&self) -> Vec<MachineEvent> {
        self.rx.try_iter().collect()
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<MachineEvent> {
        self.rx.try_recv().ok()
    }

    /// Block until the next event, or `None` once every publisher is gone.
    pub fn recv(&self) -> Option<MachineEvent> {
        self.rx.recv().ok()
    }
}

/// Create a connected publisher/observer pair.
pub fn channel() -> (EventPublisher, MachineObserver) {
    let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
    (
        EventPublisher {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        MachineObserver { rx },
    )
}
