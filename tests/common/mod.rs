//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use sortsim_rs::{Reconciliation, RunReport};
use std::time::{Duration, Instant};

/// Upper bound for any single machine run in these tests
pub fn run_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Assert that no item went missing or was double counted
pub fn assert_balanced(r: &Reconciliation) {
    assert!(
        r.is_balanced(),
        "loaded {} != producers {} + buffers {} + routers {} + sinks {} (missing {})",
        r.loaded,
        r.in_producers,
        r.in_buffers,
        r.in_routers,
        r.in_sinks,
        r.missing
    );
}

/// Sum of items currently resident in all sinks of a report
pub fn items_in_sinks(report: &RunReport) -> usize {
    report.sinks.iter().map(|s| s.stats.resident).sum()
}
