//! Core data types shared between the machine and its observers.
//!
//! - [`ProgressSnapshot`] - periodic aggregate sample taken during a run
//! - [`Reconciliation`] - final item accounting after every thread has joined

use serde::Serialize;
use std::time::Duration;

/// Aggregate counts sampled while the machine runs.
///
/// Each figure is read under its own lock, so the two may be momentarily
/// inconsistent with each other. That is acceptable for progress output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Time since the machine started.
    pub elapsed: Duration,
    /// Items still waiting inside producers.
    pub in_producers: u64,
    /// Items collected into sinks so far.
    pub collected: u64,
}

/// Final accounting of every loaded item.
///
/// `loaded == in_producers + in_buffers + in_routers + in_sinks + missing`.
/// A non-zero `missing` means items were lost or double counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub loaded: u64,
    pub in_producers: u64,
    pub in_buffers: u64,
    pub in_routers: u64,
    pub in_sinks: u64,
    pub missing: i64,
}

impl Reconciliation {
    pub fn new(loaded: u64, in_producers: u64, in_buffers: u64, in_routers: u64, in_sinks: u64) -> Self {
        let accounted = in_producers + in_buffers + in_routers + in_sinks;
        Self {
            loaded,
            in_producers,
            in_buffers,
            in_routers,
            in_sinks,
            missing: loaded as i64 - accounted as i64,
        }
    }

    /// Items that have not reached a sink yet.
    pub fn on_machine(&self) -> u64 {
        self.in_producers + self.in_buffers + self.in_routers
    }

    pub fn is_balanced(&self) -> bool {
        self.missing == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_reconciliation() {
        let r = Reconciliation::new(10, 2, 3, 1, 4);
        assert_eq!(r.on_machine(), 6);
        assert_eq!(r.missing, 0);
        assert!(r.is_balanced());
    }

    #[test]
    fn test_missing_items_detected() {
        let r = Reconciliation::new(10, 0, 0, 0, 7);
        assert_eq!(r.missing, 3);
        assert!(!r.is_balanced());
    }

    #[test]
    fn test_double_count_is_negative() {
        let r = Reconciliation::new(5, 1, 0, 0, 5);
        assert_eq!(r.missing, -1);
    }
}
