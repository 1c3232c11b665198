//! Synchronisation helpers shared by every pipeline component.
//!
//! - [`CancellationToken`] - cooperative stop signal threaded through every
//!   blocking call
//! - [`wait_until`] - condition-variable wait that honours a timeout and a
//!   cancellation token at the same time
//!
//! Blocking waits wake at least every [`CANCEL_POLL_INTERVAL`] to re-check
//! the token, which bounds how long a cancelled thread can stay parked.

use crate::pipeline::error::WaitError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on how long a parked thread goes without checking its token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Counters and queues stay structurally valid across a panic, and a worker
/// panic is reported separately when its thread is joined.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Instant `timeout` from now, or `None` if that lies beyond what
/// [`Instant`] can represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Block on `condvar` until `ready` holds, the timeout elapses, or `cancel` fires.
///
/// The predicate is checked before the token, so an operation that can
/// complete immediately does so even after cancellation.
pub(crate) fn wait_until<'a, T>(
    condvar: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    mut ready: impl FnMut(&T) -> bool,
) -> (MutexGuard<'a, T>, Result<(), WaitError>) {
    // A timeout too large to represent never expires.
    let deadline = timeout.and_then(deadline_after);

    loop {
        if ready(&guard) {
            return (guard, Ok(()));
        }
        if cancel.is_cancelled() {
            return (guard, Err(WaitError::Cancelled));
        }

        let mut slice = CANCEL_POLL_INTERVAL;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return (guard, Err(WaitError::TimedOut));
            }
            slice = slice.min(deadline - now);
        }

        guard = match condvar.wait_timeout(guard, slice) {
            Ok((g, _)) => g,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    changed: Condvar,
}

/// Cooperative stop signal shared between an owner and its worker threads.
///
/// Clones observe the same state. Once cancelled a token stays cancelled.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                lock: Mutex::new(()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Signal every holder of this token to stop.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = lock(&self.inner.lock);
        self.inner.changed.notify_all();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early with [`WaitError::Cancelled`] if
    /// the token fires first.
    pub fn sleep(&self, duration: Duration) -> Result<(), WaitError> {
        if self.wait_timeout(duration) {
            Err(WaitError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait up to `timeout` for cancellation. Returns whether the token fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = deadline_after(timeout) else {
            self.wait();
            return true;
        };
        let mut guard = lock(&self.inner.lock);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.inner.changed.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) {
        let mut guard = lock(&self.inner.lock);
        while !self.is_cancelled() {
            guard = match self.inner.changed.wait(guard) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}
