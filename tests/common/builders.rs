//! Test data builders for creating machine configurations

use sortsim_rs::config::{
    BufferConfig, DrainerConfig, MachineConfig, PortConfig, ProducerConfig, RouterConfig,
    SinkConfig, TimingConfig,
};
use sortsim_rs::pipeline::{BufferId, DrainerId, ProducerId, RouterId, SinkId};

/// Builder for creating test machine configurations
///
/// Starts with millisecond timing so runs finish quickly.
pub struct ConfigBuilder {
    config: MachineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MachineConfig {
                duration_secs: 1,
                timing: TimingConfig::fast(),
                ..MachineConfig::default()
            },
        }
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.config.timing = timing;
        self
    }

    pub fn drain_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timing.drain_timeout_ms = Some(ms);
        self
    }

    pub fn buffer(mut self, id: u32, capacity: usize, tags: &[&str]) -> Self {
        self.config.buffers.push(BufferConfig {
            id: BufferId(id),
            capacity,
            reachable_tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn producer(mut self, id: u32, buffer: u32, capacity: usize, rate: f64, items: &[&str]) -> Self {
        self.config.producers.push(ProducerConfig {
            id: ProducerId(id),
            buffer: BufferId(buffer),
            capacity,
            rate,
            items: items.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn sink(mut self, id: u32, capacity: usize, tag: &str) -> Self {
        self.config.sinks.push(SinkConfig {
            id: SinkId(id),
            capacity,
            tag: tag.to_string(),
        });
        self
    }

    /// Ports are given clockwise from north.
    pub fn router(mut self, id: &str, ports: [PortConfig; 4]) -> Self {
        self.config.routers.push(RouterConfig {
            id: RouterId::from(id),
            ports,
        });
        self
    }

    pub fn drainer(mut self, id: u32, sinks: &[u32]) -> Self {
        self.config.drainers.push(DrainerConfig {
            id: DrainerId(id),
            sinks: sinks.iter().copied().map(SinkId).collect(),
        });
        self
    }

    pub fn build(self) -> MachineConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `n` items cycling through `tags`
pub fn items<'a>(n: usize, tags: &[&'a str]) -> Vec<&'a str> {
    (0..n).map(|i| tags[i % tags.len()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .buffer(1, 2, &["a"])
            .sink(1, 3, "a")
            .producer(1, 1, 4, 10.0, &["a", "a"])
            .build();

        assert_eq!(config.buffers[0].capacity, 2);
        assert_eq!(config.total_items(), 2);
        assert!(config.validate().is_ok());
    }
}
