//! Fixed-capacity circular conveyor buffer.
//!
//! A [`BoundedBuffer`] is a monitor: one mutex guards the ring and one
//! condition variable is broadcast on every successful `put` or `take`, so
//! waiting producers and consumers both re-check their predicate. Every
//! blocking call takes a [`CancellationToken`] and reports cancellation
//! distinctly from a timeout.
//!
//! # Ordering
//!
//! Items come out of `take` in exactly the order they went into `put`.
//!
//! # Consumers
//!
//! Each buffer has exactly one consuming router. That is enforced by the
//! topology at setup, not by locking.

use crate::pipeline::error::{PutError, WaitError};
use crate::pipeline::id::BufferId;
use crate::pipeline::item::Item;
use crate::pipeline::sync::{lock, wait_until, CancellationToken};
use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Circular storage. `head` is the next slot to read, `tail` the next slot to write.
struct Ring {
    slots: Box<[Option<Item>]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn push(&mut self, item: Item) {
        debug_assert!(!self.is_full());
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
    }

    fn pop(&mut self) -> Option<Item> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        item
    }
}

/// A bounded FIFO of items connecting a producer or router to a router.
pub struct BoundedBuffer {
    id: BufferId,
    capacity: usize,
    /// Destination tags reachable through this buffer. Fixed after construction.
    reachable_tags: BTreeSet<String>,
    ring: Mutex<Ring>,
    changed: Condvar,
}

impl std::fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("count", &self.len())
            .finish()
    }
}

impl BoundedBuffer {
    /// Create an empty buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects that earlier.
    pub fn new<I, S>(id: BufferId, capacity: usize, reachable_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        assert!(capacity > 0, "{id} must have a positive capacity");
        Self {
            id,
            capacity,
            reachable_tags: reachable_tags.into_iter().map(Into::into).collect(),
            ring: Mutex::new(Ring::new(capacity)),
            changed: Condvar::new(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reachable_tags(&self) -> &BTreeSet<String> {
        &self.reachable_tags
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        lock(&self.ring).count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        lock(&self.ring).is_full()
    }

    /// Append `item`, blocking while the buffer is full.
    pub fn put(&self, item: Item, cancel: &CancellationToken) -> Result<(), PutError> {
        self.put_inner(item, None, cancel)
    }

    /// Append `item`, giving up with [`WaitError::TimedOut`] after `timeout`.
    pub fn put_timeout(
        &self,
        item: Item,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), PutError> {
        self.put_inner(item, Some(timeout), cancel)
    }

    /// Remove the head item, blocking while the buffer is empty.
    pub fn take(&self, cancel: &CancellationToken) -> Result<Item, WaitError> {
        self.take_inner(None, cancel)
    }

    /// Remove the head item, giving up with [`WaitError::TimedOut`] after `timeout`.
    pub fn take_timeout(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Item, WaitError> {
        self.take_inner(Some(timeout), cancel)
    }

    /// Remove the head item if one is present, without blocking.
    pub fn try_take(&self) -> Option<Item> {
        let mut ring = lock(&self.ring);
        let item = ring.pop();
        if item.is_some() {
            self.changed.notify_all();
        }
        item
    }

    fn put_inner(
        &self,
        item: Item,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), PutError> {
        let guard = lock(&self.ring);
        let (mut ring, result) =
            wait_until(&self.changed, guard, timeout, cancel, |r| !r.is_full());
        if let Err(reason) = result {
            return Err(PutError::new(reason, item));
        }

        tracing::trace!("{}: put {:?} ({} held)", self.id, item, ring.count + 1);
        ring.push(item);
        self.changed.notify_all();
        Ok(())
    }

    fn take_inner(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Item, WaitError> {
        let guard = lock(&self.ring);
        let (mut ring, result) =
            wait_until(&self.changed, guard, timeout, cancel, |r| r.count > 0);
        result?;

        match ring.pop() {
            Some(item) => {
                self.changed.notify_all();
                Ok(item)
            }
            // The predicate held under this same guard.
            None => unreachable!("{} reported items but the ring was empty", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn item(id: u64) -> Item {
        Item::new(id, "0-3")
    }

    fn buffer(capacity: usize) -> BoundedBuffer {
        BoundedBuffer::new(BufferId(1), capacity, ["0-3"])
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = buffer(3);
        assert!(buf.is_empty());
        assert!(!buf.is_full());
        assert_eq!(buf.capacity(), 3);
        assert!(buf.reachable_tags().contains("0-3"));
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        let _ = BoundedBuffer::new(BufferId(1), 0, Vec::<String>::new());
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let buf = buffer(2);
        let token = CancellationToken::new();
        let mut taken = Vec::new();

        for id in 0..7 {
            buf.put(item(id), &token).unwrap();
            if buf.is_full() {
                taken.push(buf.take(&token).unwrap().id());
            }
        }
        while let Some(item) = buf.try_take() {
            taken.push(item.id());
        }

        assert_eq!(taken, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_put_timeout_returns_item_when_full() {
        let buf = buffer(1);
        let token = CancellationToken::new();
        buf.put(item(1), &token).unwrap();

        let start = Instant::now();
        let err = buf
            .put_timeout(item(2), Duration::from_millis(30), &token)
            .unwrap_err();
        assert_eq!(err.reason, WaitError::TimedOut);
        assert_eq!(err.into_item().id(), 2);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_take_timeout_on_empty() {
        let buf = buffer(2);
        let token = CancellationToken::new();
        assert_eq!(
            buf.take_timeout(Duration::from_millis(10), &token),
            Err(WaitError::TimedOut)
        );
        assert!(buf.try_take().is_none());
    }

    #[test]
    fn test_cancel_distinct_from_timeout() {
        let buf = Arc::new(buffer(1));
        let token = CancellationToken::new();
        buf.put(item(1), &token).unwrap();

        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let err = buf
            .put_timeout(item(2), Duration::from_secs(10), &token)
            .unwrap_err();
        assert!(err.is_cancelled());
        canceller.join().unwrap();

        // Nothing lost, nothing added.
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.take(&token).unwrap().id(), 1);
        assert_eq!(buf.take(&token), Err(WaitError::Cancelled));
    }

    #[test]
    fn test_blocked_put_released_by_take() {
        // Capacity 3: A, B, C fit; D waits for a take.
        let buf = Arc::new(buffer(3));
        let token = CancellationToken::new();
        for id in 0..3 {
            buf.put_timeout(item(id), Duration::ZERO, &token).unwrap();
        }

        let writer = {
            let buf = Arc::clone(&buf);
            let token = token.clone();
            thread::spawn(move || buf.put(item(3), &token))
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!writer.is_finished());
        assert_eq!(buf.take(&token).unwrap().id(), 0);

        writer.join().unwrap().unwrap();
        let rest: Vec<u64> = (0..3).map(|_| buf.take(&token).unwrap().id()).collect();
        assert_eq!(rest, vec![1, 2, 3]);
    }

    #[test]
    fn test_spsc_preserves_order() {
        let buf = Arc::new(buffer(4));
        let token = CancellationToken::new();
        let count = 500;

        let producer = {
            let buf = Arc::clone(&buf);
            let token = token.clone();
            thread::spawn(move || {
                for id in 0..count {
                    buf.put(item(id), &token).unwrap();
                }
            })
        };

        let mut received = Vec::with_capacity(count as usize);
        for _ in 0..count {
            received.push(buf.take(&token).unwrap().id());
            assert!(buf.len() <= buf.capacity());
        }
        producer.join().unwrap();

        assert_eq!(received, (0..count).collect::<Vec<_>>());
    }
}
