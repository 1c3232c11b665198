//! Producer node: a feed station that deposits a preloaded batch of items
//! onto one buffer at a fixed rate.
//!
//! The batch is owned by the producer from construction; once its thread
//! starts nothing else mutates it. Each successful deposit removes the item
//! from the batch and decrements the machine-wide resident tally inside the
//! producer's own critical section. An item whose deposit is cancelled stays
//! in the batch and is still counted as on the machine.

use crate::error::{Result, SortError};
use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::context::MachineContext;
use crate::pipeline::id::ProducerId;
use crate::pipeline::item::Item;
use crate::pipeline::sync::{lock, CancellationToken};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Post-run figures for one producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProducerStats {
    pub id: ProducerId,
    /// Items placed on the target buffer.
    pub deposited: u64,
    /// Items still held.
    pub remaining: usize,
    /// Wall-clock time spent blocked on the target buffer.
    pub wait_time: Duration,
}

struct ProducerState {
    items: VecDeque<Item>,
    deposited: u64,
    wait_time: Duration,
}

/// Read-only view of a producer that outlives its thread.
#[derive(Clone)]
pub struct ProducerHandle {
    id: ProducerId,
    state: Arc<Mutex<ProducerState>>,
}

impl ProducerHandle {
    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn remaining(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn stats(&self) -> ProducerStats {
        let state = lock(&self.state);
        ProducerStats {
            id: self.id,
            deposited: state.deposited,
            remaining: state.items.len(),
            wait_time: state.wait_time,
        }
    }
}

pub struct Producer {
    id: ProducerId,
    target: Arc<BoundedBuffer>,
    interval: Duration,
    state: Arc<Mutex<ProducerState>>,
    context: Arc<MachineContext>,
}

impl Producer {
    /// Create a producer preloaded with `items`.
    ///
    /// Fails if the preload exceeds `capacity` or `rate` (items per second) is
    /// not a positive finite number. The caller must have counted `items`
    /// into the context's resident tally.
    pub fn new(
        id: ProducerId,
        target: Arc<BoundedBuffer>,
        capacity: usize,
        rate: f64,
        items: Vec<Item>,
        context: Arc<MachineContext>,
    ) -> Result<Self> {
        if items.len() > capacity {
            return Err(SortError::config(format!(
                "{id} holds {} items but its capacity is {capacity}",
                items.len()
            )));
        }
        let interval = deposit_interval(rate).ok_or_else(|| {
            SortError::config(format!(
                "{id} rate must be a positive number of items per second, got {rate}"
            ))
        })?;

        Ok(Self {
            id,
            target,
            interval,
            state: Arc::new(Mutex::new(ProducerState {
                items: items.into(),
                deposited: 0,
                wait_time: Duration::ZERO,
            })),
            context,
        })
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn handle(&self) -> ProducerHandle {
        ProducerHandle {
            id: self.id,
            state: Arc::clone(&self.state),
        }
    }

    /// Deposit items until the batch is empty or `cancel` fires.
    pub fn run(self, cancel: CancellationToken) -> ProducerStats {
        let remaining = lock(&self.state).items.len();
        tracing::info!(
            "{} started: {} items for {} every {:?}",
            self.id,
            remaining,
            self.target.id(),
            self.interval
        );

        loop {
            let next = lock(&self.state).items.front().cloned();
            let Some(item) = next else {
                break;
            };

            if cancel.sleep(self.interval).is_err() {
                break;
            }

            let started = Instant::now();
            let result = self.target.put(item, &cancel);
            let waited = started.elapsed();

            match result {
                Ok(()) => self.commit_deposit(waited),
                Err(err) => {
                    lock(&self.state).wait_time += waited;
                    tracing::debug!(
                        "{} stopped while waiting on {} holding {:?}",
                        self.id,
                        self.target.id(),
                        err.item
                    );
                    break;
                }
            }
        }

        let stats = self.handle().stats();
        tracing::info!(
            "{} stopped: deposited {}, {} remaining, waited {:.3}s",
            self.id,
            stats.deposited,
            stats.remaining,
            stats.wait_time.as_secs_f64()
        );
        stats
    }

    fn commit_deposit(&self, waited: Duration) {
        let mut state = lock(&self.state);
        let mut resident = self.context.resident().hold();
        if let Some(item) = state.items.pop_front() {
            *resident -= 1;
            state.deposited += 1;
            tracing::trace!("{} deposited {:?} on {}", self.id, item, self.target.id());
        }
        state.wait_time += waited;
    }
}

/// Pause between deposits at `rate` items per second.
///
/// `None` if the rate is not positive and finite, or so small that the
/// interval does not fit in a [`Duration`].
pub(crate) fn deposit_interval(rate: f64) -> Option<Duration> {
    if !(rate.is_finite() && rate > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate).ok()
}
