//! Terminal collection sink.
//!
//! A [`Sink`] accepts items until it reaches capacity and is only ever
//! emptied as a whole by [`Sink::drain_when_full`]. There is no partial
//! removal. Every accepted item bumps the machine-wide collected tally inside
//! the sink's own critical section.

use crate::pipeline::context::MachineContext;
use crate::pipeline::error::{PutError, WaitError};
use crate::pipeline::id::SinkId;
use crate::pipeline::item::Item;
use crate::pipeline::sync::{lock, wait_until, CancellationToken};
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct SinkState {
    items: Vec<Item>,
    /// Items accepted since construction, including discharged ones.
    collected: u64,
    drains: u64,
    discharged: u64,
}

/// Counters describing a sink's lifetime activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    /// Items currently held.
    pub resident: usize,
    /// Items accepted since the run started.
    pub collected: u64,
    /// Number of times the sink was emptied.
    pub drains: u64,
    /// Items removed by draining.
    pub discharged: u64,
}

pub struct Sink {
    id: SinkId,
    tag: String,
    capacity: usize,
    state: Mutex<SinkState>,
    changed: Condvar,
    context: Arc<MachineContext>,
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("capacity", &self.capacity)
            .field("count", &self.len())
            .finish()
    }
}

impl Sink {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(
        id: SinkId,
        capacity: usize,
        tag: impl Into<String>,
        context: Arc<MachineContext>,
    ) -> Self {
        assert!(capacity > 0, "{id} must have a positive capacity");
        Self {
            id,
            tag: tag.into(),
            capacity,
            state: Mutex::new(SinkState {
                items: Vec::with_capacity(capacity),
                collected: 0,
                drains: 0,
                discharged: 0,
            }),
            changed: Condvar::new(),
            context,
        }
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn stats(&self) -> SinkStats {
        let state = lock(&self.state);
        SinkStats {
            resident: state.items.len(),
            collected: state.collected,
            drains: state.drains,
            discharged: state.discharged,
        }
    }

    /// Add `item`, blocking while the sink is full.
    pub fn put(&self, item: Item, cancel: &CancellationToken) -> Result<(), PutError> {
        self.put_inner(item, None, cancel)
    }

    /// Add `item`, giving up with [`WaitError::TimedOut`] after `timeout`.
    pub fn put_timeout(
        &self,
        item: Item,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), PutError> {
        self.put_inner(item, Some(timeout), cancel)
    }

    fn put_inner(
        &self,
        item: Item,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), PutError> {
        let capacity = self.capacity;
        let guard = lock(&self.state);
        let (mut state, result) = wait_until(&self.changed, guard, timeout, cancel, |s| {
            s.items.len() < capacity
        });
        if let Err(reason) = result {
            return Err(PutError::new(reason, item));
        }

        tracing::debug!("{} collected {:?}", self.id, item);
        {
            let mut collected = self.context.collected().hold();
            state.items.push(item);
            state.collected += 1;
            *collected += 1;
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Wait up to `wait` for the sink to fill, then empty it if it is full.
    ///
    /// Returns the number of items discharged: either the full capacity or
    /// zero. The collected tally is left untouched.
    pub fn drain_when_full(
        &self,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<usize, WaitError> {
        let capacity = self.capacity;
        let guard = lock(&self.state);
        let (mut state, result) = wait_until(&self.changed, guard, Some(wait), cancel, |s| {
            s.items.len() == capacity
        });
        match result {
            Ok(()) => {}
            Err(WaitError::TimedOut) => return Ok(0),
            Err(WaitError::Cancelled) => return Err(WaitError::Cancelled),
        }

        let discharged = state.items.len();
        state.items.clear();
        state.drains += 1;
        state.discharged += discharged as u64;
        self.changed.notify_all();
        Ok(discharged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::RoutingRegistry;
    use std::thread;

    fn context() -> Arc<MachineContext> {
        Arc::new(MachineContext::new(RoutingRegistry::new(), 0))
    }

    fn item(id: u64) -> Item {
        Item::new(id, "0-3")
    }

    #[test]
    fn test_put_updates_local_and_global_counts() {
        let ctx = context();
        let sink = Sink::new(SinkId(1), 3, "0-3", Arc::clone(&ctx));
        let token = CancellationToken::new();

        sink.put(item(1), &token).unwrap();
        sink.put(item(2), &token).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(ctx.collected().get(), 2);
        assert_eq!(sink.stats().collected, 2);
    }

    #[test]
    fn test_drain_only_when_full() {
        let ctx = context();
        let sink = Sink::new(SinkId(1), 2, "0-3", Arc::clone(&ctx));
        let token = CancellationToken::new();

        sink.put(item(1), &token).unwrap();
        assert_eq!(sink.drain_when_full(Duration::from_millis(10), &token), Ok(0));
        assert_eq!(sink.len(), 1);

        sink.put(item(2), &token).unwrap();
        assert_eq!(sink.drain_when_full(Duration::from_millis(10), &token), Ok(2));
        assert!(sink.is_empty());

        let stats = sink.stats();
        assert_eq!(stats.drains, 1);
        assert_eq!(stats.discharged, 2);
        // Draining never reduces the collected tally.
        assert_eq!(ctx.collected().get(), 2);
    }

    #[test]
    fn test_full_sink_blocks_put_until_drained() {
        let sink = Arc::new(Sink::new(SinkId(1), 1, "0-3", context()));
        let token = CancellationToken::new();
        sink.put(item(1), &token).unwrap();

        let err = sink
            .put_timeout(item(2), Duration::from_millis(10), &token)
            .unwrap_err();
        assert_eq!(err.reason, WaitError::TimedOut);

        let writer = {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            thread::spawn(move || sink.put(item(3), &token))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.drain_when_full(Duration::ZERO, &token), Ok(1));
        writer.join().unwrap().unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_drain_wait_woken_by_put() {
        let sink = Arc::new(Sink::new(SinkId(1), 1, "0-3", context()));
        let token = CancellationToken::new();

        let drainer = {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            thread::spawn(move || sink.drain_when_full(Duration::from_secs(5), &token))
        };
        thread::sleep(Duration::from_millis(20));
        sink.put(item(1), &token).unwrap();
        assert_eq!(drainer.join().unwrap(), Ok(1));
    }

    #[test]
    fn test_cancel_unblocks_drain_wait() {
        let sink = Arc::new(Sink::new(SinkId(1), 4, "0-3", context()));
        let token = CancellationToken::new();

        let drainer = {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            thread::spawn(move || sink.drain_when_full(Duration::from_secs(30), &token))
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(drainer.join().unwrap(), Err(WaitError::Cancelled));
    }
}
