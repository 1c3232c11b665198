//! Configuration module for the sorting machine
//!
//! This module holds the topology a machine is built from:
//! - Buffers (conveyor belts) with their reachable destination tags
//! - Producers (hoppers) with their preloaded items
//! - Sinks (sacks) with the tag they collect
//! - Routers (turntables) with their four port bindings
//! - Drainers (elves) with the sinks they empty
//! - Timing constants and the run duration
//!
//! # File formats
//!
//! [`MachineConfig::load`] picks a format from the file extension:
//!
//! - `.toml` - TOML
//! - `.json` - JSON
//! - anything else - the line-oriented scenario format (see [`scenario`])
//!
//! # Example
//!
//! ```ignore
//! use sortsim_rs::config::MachineConfig;
//!
//! let config = MachineConfig::load("scenario1.txt")?;
//! config.validate()?;
//! config.save("scenario1.toml")?;
//! ```

pub mod scenario;

use crate::error::{Result, SortError};
use crate::pipeline::id::{BufferId, DrainerId, ProducerId, RouterId, SinkId, PORT_COUNT};
use crate::pipeline::nodes::producer::deposit_interval;
use crate::pipeline::nodes::TransitTiming;
use crate::pipeline::port::PortKind;
use crate::pipeline::sync::deadline_after;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Default run duration in seconds
pub const DEFAULT_DURATION_SECS: u64 = 60;

/// Default time to move an item onto a router, in milliseconds
pub const DEFAULT_MOVE_IN_MS: u64 = 750;

/// Default time for a router to turn between unaligned ports, in milliseconds
pub const DEFAULT_ROTATE_MS: u64 = 500;

/// Default time to move an item off a router, in milliseconds
pub const DEFAULT_MOVE_OUT_MS: u64 = 750;

/// Default time a drainer waits on each sink, in milliseconds
pub const DEFAULT_DRAIN_WAIT_MS: u64 = 400;

/// Default interval between progress samples, in milliseconds
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Default router pause after a pass with no input, in milliseconds
pub const DEFAULT_IDLE_POLL_MS: u64 = 5;

/// Default bound on waiting for in-flight items to reach sinks, in milliseconds
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;

// ==================== Component Declarations ====================

/// A conveyor buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub id: BufferId,
    pub capacity: usize,
    /// Destination tags that can be reached by travelling along this buffer.
    #[serde(default)]
    pub reachable_tags: Vec<String>,
}

/// A feed producer and its preloaded items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub id: ProducerId,
    /// Buffer the producer deposits onto.
    pub buffer: BufferId,
    /// Maximum number of items the producer may be loaded with.
    pub capacity: usize,
    /// Deposit rate in items per second.
    pub rate: f64,
    /// Tags of the preloaded items, in deposit order.
    #[serde(default)]
    pub items: Vec<String>,
}

/// A collection sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub id: SinkId,
    pub capacity: usize,
    pub tag: String,
}

/// One router port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortConfig {
    pub role: PortKind,
    /// Buffer or sink id, depending on `role`. Absent for unbound ports.
    #[serde(default)]
    pub target: Option<u32>,
}

impl PortConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn input(buffer: u32) -> Self {
        Self {
            role: PortKind::InputBuffer,
            target: Some(buffer),
        }
    }

    pub fn output_buffer(buffer: u32) -> Self {
        Self {
            role: PortKind::OutputBuffer,
            target: Some(buffer),
        }
    }

    pub fn output_sink(sink: u32) -> Self {
        Self {
            role: PortKind::OutputSink,
            target: Some(sink),
        }
    }
}

/// A routing turntable. Ports are listed clockwise from north.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub id: RouterId,
    pub ports: [PortConfig; PORT_COUNT],
}

/// A drainer and the sinks it is responsible for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainerConfig {
    pub id: DrainerId,
    pub sinks: Vec<SinkId>,
}

// ==================== Timing ====================

/// Delay constants used while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub move_in_ms: u64,
    pub rotate_ms: u64,
    pub move_out_ms: u64,
    /// How long a drainer waits on each sink to fill.
    pub drain_wait_ms: u64,
    /// Interval between progress samples.
    pub sample_interval_ms: u64,
    /// Router pause after a pass that found no input.
    pub idle_poll_ms: u64,
    /// Bound on the shutdown wait for in-flight items. `None` waits forever.
    pub drain_timeout_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            move_in_ms: DEFAULT_MOVE_IN_MS,
            rotate_ms: DEFAULT_ROTATE_MS,
            move_out_ms: DEFAULT_MOVE_OUT_MS,
            drain_wait_ms: DEFAULT_DRAIN_WAIT_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            drain_timeout_ms: Some(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}

impl TimingConfig {
    /// Millisecond-scale timing for fast test runs.
    pub fn fast() -> Self {
        Self {
            move_in_ms: 1,
            rotate_ms: 1,
            move_out_ms: 1,
            drain_wait_ms: 5,
            sample_interval_ms: 50,
            idle_poll_ms: 1,
            drain_timeout_ms: Some(5_000),
        }
    }

    pub fn transit(&self) -> TransitTiming {
        TransitTiming {
            move_in: Duration::from_millis(self.move_in_ms),
            rotate: Duration::from_millis(self.rotate_ms),
            move_out: Duration::from_millis(self.move_out_ms),
            idle_poll: Duration::from_millis(self.idle_poll_ms.max(1)),
        }
    }

    pub fn drain_wait(&self) -> Duration {
        Duration::from_millis(self.drain_wait_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }
}

// ==================== Machine Configuration ====================

/// Complete description of one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// How long producers run before being told to stop, in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub buffers: Vec<BufferConfig>,

    #[serde(default)]
    pub producers: Vec<ProducerConfig>,

    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    #[serde(default)]
    pub routers: Vec<RouterConfig>,

    #[serde(default)]
    pub drainers: Vec<DrainerConfig>,
}

fn default_duration_secs() -> u64 {
    DEFAULT_DURATION_SECS
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            timing: TimingConfig::default(),
            buffers: Vec::new(),
            producers: Vec::new(),
            sinks: Vec::new(),
            routers: Vec::new(),
            drainers: Vec::new(),
        }
    }
}

impl MachineConfig {
    /// Load a configuration, choosing the format from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SortError::Config(format!("Failed to read configuration {:?}: {}", path, e))
        })?;

        let config: MachineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| {
                SortError::Config(format!("Failed to parse TOML configuration {:?}: {}", path, e))
            })?,
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                SortError::Config(format!("Failed to parse JSON configuration {:?}: {}", path, e))
            })?,
            _ => scenario::parse(&content)?,
        };

        tracing::debug!("Loaded configuration from {:?}: {}", path, summary(&config));
        Ok(config)
    }

    /// Save as TOML or JSON depending on the extension (TOML by default).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| SortError::Serialization(e.to_string()))?,
            _ => toml::to_string_pretty(self).map_err(|e| SortError::Serialization(e.to_string()))?,
        };

        std::fs::write(path, content).map_err(|e| {
            SortError::Config(format!("Failed to write configuration {:?}: {}", path, e))
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Total number of preloaded items across all producers.
    pub fn total_items(&self) -> u64 {
        self.producers.iter().map(|p| p.items.len() as u64).sum()
    }

    /// Check the topology for every setup-time error.
    pub fn validate(&self) -> Result<()> {
        let buffers = unique_ids("Buffer", self.buffers.iter().map(|b| b.id))?;
        let sinks = unique_ids("Sink", self.sinks.iter().map(|s| s.id))?;
        unique_ids("Producer", self.producers.iter().map(|p| p.id))?;
        unique_ids("Router", self.routers.iter().map(|r| r.id.clone()))?;
        unique_ids("Drainer", self.drainers.iter().map(|d| d.id))?;

        if deadline_after(self.duration()).is_none() {
            return Err(SortError::config(format!(
                "Run duration of {}s is too long",
                self.duration_secs
            )));
        }

        for buffer in &self.buffers {
            if buffer.capacity == 0 {
                return Err(SortError::config(format!("{} has zero capacity", buffer.id)));
            }
        }

        let mut tags = HashMap::new();
        for sink in &self.sinks {
            if sink.capacity == 0 {
                return Err(SortError::config(format!("{} has zero capacity", sink.id)));
            }
            if let Some(existing) = tags.insert(sink.tag.as_str(), sink.id) {
                return Err(SortError::config(format!(
                    "Tag {:?} is collected by both {} and {}",
                    sink.tag, existing, sink.id
                )));
            }
        }

        for buffer in &self.buffers {
            for tag in &buffer.reachable_tags {
                if !tags.contains_key(tag.as_str()) {
                    return Err(SortError::config(format!(
                        "{} reaches tag {:?} but no sink collects it",
                        buffer.id, tag
                    )));
                }
            }
        }

        for producer in &self.producers {
            if !buffers.contains(&producer.buffer) {
                return Err(SortError::config(format!(
                    "{} feeds undeclared {}",
                    producer.id, producer.buffer
                )));
            }
            if producer.items.len() > producer.capacity {
                return Err(SortError::config(format!(
                    "{} must be large enough to contain its items ({} > {})",
                    producer.id,
                    producer.items.len(),
                    producer.capacity
                )));
            }
            if deposit_interval(producer.rate).is_none() {
                return Err(SortError::config(format!(
                    "{} rate must be a positive number of items per second, got {}",
                    producer.id, producer.rate
                )));
            }
        }

        let mut consumers: HashMap<BufferId, &RouterId> = HashMap::new();
        for router in &self.routers {
            for (index, port) in router.ports.iter().enumerate() {
                let target = match (port.role, port.target) {
                    (PortKind::None, _) => continue,
                    (_, None) => {
                        return Err(SortError::config(format!(
                            "{} port {} is {:?} but has no target",
                            router.id, index, port.role
                        )))
                    }
                    (_, Some(target)) => target,
                };

                match port.role {
                    PortKind::InputBuffer | PortKind::OutputBuffer => {
                        let buffer = BufferId(target);
                        if !buffers.contains(&buffer) {
                            return Err(SortError::config(format!(
                                "{} port {} references undeclared {}",
                                router.id, index, buffer
                            )));
                        }
                        if port.role == PortKind::InputBuffer {
                            if let Some(other) = consumers.insert(buffer, &router.id) {
                                return Err(SortError::config(format!(
                                    "{} is consumed by both {} and {}",
                                    buffer, other, router.id
                                )));
                            }
                        }
                    }
                    PortKind::OutputSink => {
                        let sink = SinkId(target);
                        if !sinks.contains(&sink) {
                            return Err(SortError::config(format!(
                                "{} port {} references undeclared {}",
                                router.id, index, sink
                            )));
                        }
                    }
                    PortKind::None => {}
                }
            }
        }

        let mut assigned: HashMap<SinkId, DrainerId> = HashMap::new();
        for drainer in &self.drainers {
            for sink in &drainer.sinks {
                if !sinks.contains(sink) {
                    return Err(SortError::config(format!(
                        "{} is assigned undeclared {}",
                        drainer.id, sink
                    )));
                }
                if let Some(other) = assigned.insert(*sink, drainer.id) {
                    return Err(SortError::config(format!(
                        "{} is emptied by both {} and {}",
                        sink, other, drainer.id
                    )));
                }
            }
        }

        for producer in &self.producers {
            for tag in &producer.items {
                if !tags.contains_key(tag.as_str()) {
                    tracing::warn!("{} holds an item tagged {:?} that no sink collects", producer.id, tag);
                }
            }
        }

        Ok(())
    }
}

fn unique_ids<T>(kind: &str, ids: impl Iterator<Item = T>) -> Result<HashSet<T>>
where
    T: std::hash::Hash + Eq + std::fmt::Display,
{
    let mut seen = HashSet::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(SortError::config(format!("{kind} id {id} is declared twice")));
        }
        seen.insert(id);
    }
    Ok(seen)
}

/// One-line description of a configuration for logs.
pub fn summary(config: &MachineConfig) -> String {
    format!(
        "{}s: {} belts, {} hoppers, {} sacks, {} turntables, {} elves, {} items",
        config.duration_secs,
        config.buffers.len(),
        config.producers.len(),
        config.sinks.len(),
        config.routers.len(),
        config.drainers.len(),
        config.total_items()
    )
}
