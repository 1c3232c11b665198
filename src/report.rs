//! Final run report.
//!
//! Built once every thread has joined, so all figures are exact. The
//! [`Display`](std::fmt::Display) impl renders the human-readable summary the
//! CLI prints; `serde` gives the `--json` form.

use crate::pipeline::executor::{Machine, RunTimes};
use crate::pipeline::id::{BufferId, SinkId};
use crate::pipeline::nodes::{DrainerStats, ProducerStats, RouterStats};
use crate::pipeline::sink::SinkStats;
use crate::types::Reconciliation;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferCount {
    pub id: BufferId,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub id: SinkId,
    pub tag: String,
    #[serde(flatten)]
    pub stats: SinkStats,
}

/// Everything a finished run has to say about itself.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_time: Duration,
    pub input_stopped_after: Duration,
    /// Whether every deposited item reached a sink before shutdown.
    pub drained: bool,
    pub producers: Vec<ProducerStats>,
    pub buffers: Vec<BufferCount>,
    pub routers: Vec<RouterStats>,
    pub sinks: Vec<SinkReport>,
    pub drainers: Vec<DrainerStats>,
    pub reconciliation: Reconciliation,
}

impl RunReport {
    pub(crate) fn from_machine(machine: &Machine, times: RunTimes) -> Self {
        Self {
            run_time: times.total,
            input_stopped_after: times.input_stopped,
            drained: times.drained,
            producers: machine.producer_stats(),
            buffers: machine
                .buffer_counts()
                .into_iter()
                .map(|(id, items)| BufferCount { id, items })
                .collect(),
            routers: machine.router_stats(),
            sinks: machine
                .sinks()
                .iter()
                .map(|s| SinkReport {
                    id: s.id(),
                    tag: s.tag().to_string(),
                    stats: s.stats(),
                })
                .collect(),
            drainers: machine.drainer_stats(),
            reconciliation: machine.reconciliation(),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::SortError::Serialization(e.to_string()))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FINAL REPORT")?;
        writeln!(f)?;
        writeln!(f, "Total Run Time: {:.1}s.", self.run_time.as_secs_f64())?;
        writeln!(
            f,
            "Input stopped after {:.1}s.",
            self.input_stopped_after.as_secs_f64()
        )?;
        writeln!(f)?;

        for p in &self.producers {
            writeln!(
                f,
                "{} deposited {} items and waited {:.3}s ({} left).",
                p.id,
                p.deposited,
                p.wait_time.as_secs_f64(),
                p.remaining
            )?;
        }
        for b in &self.buffers {
            writeln!(f, "{} holds {} items.", b.id, b.items)?;
        }
        for r in &self.routers {
            writeln!(
                f,
                "{} moved {} items{}.",
                r.id,
                r.moved,
                if r.holding { " and still holds one" } else { "" }
            )?;
        }
        for s in &self.sinks {
            writeln!(
                f,
                "{} ({}) holds {}, collected {}, emptied {} times ({} items).",
                s.id, s.tag, s.stats.resident, s.stats.collected, s.stats.drains, s.stats.discharged
            )?;
        }
        for d in &self.drainers {
            writeln!(
                f,
                "{} emptied {} sacks ({} items).",
                d.id, d.drains, d.discharged
            )?;
        }

        let r = &self.reconciliation;
        writeln!(f)?;
        writeln!(
            f,
            "Out of {} items loaded, {} are still on the machine, and {} made it into the sinks.",
            r.loaded,
            r.on_machine(),
            r.in_sinks
        )?;
        write!(f, "{} items went missing.", r.missing)?;
        if !self.drained {
            write!(f, " (Shutdown did not wait for every item to arrive.)")?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::{DrainerId, ProducerId, RouterId};
    use crate::pipeline::nodes::RouterPhase;

    fn report() -> RunReport {
        RunReport {
            run_time: Duration::from_millis(12_300),
            input_stopped_after: Duration::from_secs(10),
            drained: true,
            producers: vec![ProducerStats {
                id: ProducerId(1),
                deposited: 5,
                remaining: 0,
                wait_time: Duration::from_millis(250),
            }],
            buffers: vec![BufferCount {
                id: BufferId(1),
                items: 0,
            }],
            routers: vec![RouterStats {
                id: RouterId::from("A"),
                moved: 5,
                holding: false,
                phase: RouterPhase::Stopped,
            }],
            sinks: vec![SinkReport {
                id: SinkId(1),
                tag: "0-3".into(),
                stats: SinkStats {
                    resident: 1,
                    collected: 5,
                    drains: 1,
                    discharged: 4,
                },
            }],
            drainers: vec![DrainerStats {
                id: DrainerId(1),
                drains: 1,
                discharged: 4,
            }],
            reconciliation: Reconciliation::new(5, 0, 0, 0, 5),
        }
    }

    #[test]
    fn test_display_summary() {
        let text = report().to_string();
        assert!(text.starts_with("FINAL REPORT"));
        assert!(text.contains("Total Run Time: 12.3s."));
        assert!(text.contains("Hopper 1 deposited 5 items and waited 0.250s"));
        assert!(text.contains("Sack 1 (0-3) holds 1, collected 5, emptied 1 times"));
        assert!(text.contains("Out of 5 items loaded, 0 are still on the machine, and 5 made it"));
        assert!(text.contains("0 items went missing."));
        assert!(!text.contains("did not wait"));
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(json["reconciliation"]["missing"], 0);
        assert_eq!(json["sinks"][0]["tag"], "0-3");
        assert_eq!(json["sinks"][0]["collected"], 5);
        assert_eq!(json["routers"][0]["id"], "A");
        assert_eq!(json["producers"][0]["deposited"], 5);
    }
}
