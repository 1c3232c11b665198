//! Shared machine context: the routing registry and the two global tallies.
//!
//! One [`MachineContext`] is built at setup and handed to every component as
//! an `Arc`.
//!
//! # Registry discipline
//!
//! The [`RoutingRegistry`] is filled through `&mut` methods while the machine
//! is being wired. Once wrapped in the context it is only reachable through
//! `&`, so the many router threads read it without locking.
//!
//! # Tally discipline
//!
//! Each [`Tally`] has its own lock. A component always takes its own lock
//! first and the tally lock second, and updates both counters before
//! releasing either, so the aggregate never disagrees with the sum of the
//! instance counters. No code path holds a tally lock while acquiring a
//! component lock.

use crate::pipeline::error::PipelineError;
use crate::pipeline::id::SinkId;
use crate::pipeline::sync::lock;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Mapping from destination tag to the sink collecting that tag.
#[derive(Debug, Default, Clone)]
pub struct RoutingRegistry {
    destinations: HashMap<String, SinkId>,
}

impl RoutingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that items tagged `tag` are collected by `sink`.
    ///
    /// Each tag may be registered once. A second registration is rejected and
    /// leaves the existing entry in place.
    pub fn register(&mut self, tag: impl Into<String>, sink: SinkId) -> Result<(), SinkId> {
        match self.destinations.entry(tag.into()) {
            std::collections::hash_map::Entry::Occupied(existing) => Err(*existing.get()),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(sink);
                Ok(())
            }
        }
    }

    /// Sink collecting `tag`, if any.
    pub fn resolve(&self, tag: &str) -> Option<SinkId> {
        self.destinations.get(tag).copied()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// A process-wide item count guarded by its own lock.
#[derive(Debug, Default)]
pub struct Tally {
    value: Mutex<u64>,
}

impl Tally {
    pub fn new(initial: u64) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    /// Current value. Takes only this tally's lock.
    pub fn get(&self) -> u64 {
        *lock(&self.value)
    }

    /// Lock the tally so it can be updated inside a component's critical section.
    pub(crate) fn hold(&self) -> MutexGuard<'_, u64> {
        lock(&self.value)
    }
}

/// State shared by every component of one machine.
#[derive(Debug)]
pub struct MachineContext {
    registry: RoutingRegistry,
    /// Items preloaded at setup.
    loaded: u64,
    /// Items still held by producers.
    resident: Tally,
    /// Items ever placed into sinks. Draining does not reduce it.
    collected: Tally,
    /// First fatal run-time defect, if any.
    fault: Mutex<Option<PipelineError>>,
}

impl MachineContext {
    /// Build a context once setup has finished filling `registry`.
    ///
    /// `loaded` is the total number of items preloaded into producers.
    pub fn new(registry: RoutingRegistry, loaded: u64) -> Self {
        Self {
            registry,
            loaded,
            resident: Tally::new(loaded),
            collected: Tally::new(0),
            fault: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &RoutingRegistry {
        &self.registry
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    pub fn resident(&self) -> &Tally {
        &self.resident
    }

    pub fn collected(&self) -> &Tally {
        &self.collected
    }

    /// Record a fatal defect. Only the first one is kept.
    pub fn raise(&self, error: PipelineError) {
        let mut fault = lock(&self.fault);
        if fault.is_none() {
            tracing::error!("Pipeline fault: {}", error);
            *fault = Some(error);
        }
    }

    pub fn fault(&self) -> Option<PipelineError> {
        lock(&self.fault).clone()
    }

    pub fn has_fault(&self) -> bool {
        lock(&self.fault).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::RouterId;

    #[test]
    fn test_registry_is_write_once_per_tag() {
        let mut registry = RoutingRegistry::new();
        assert!(registry.register("0-3", SinkId(1)).is_ok());
        assert_eq!(registry.register("0-3", SinkId(2)), Err(SinkId(1)));
        assert_eq!(registry.resolve("0-3"), Some(SinkId(1)));
        assert_eq!(registry.resolve("4-6"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tally_hold_updates_value() {
        let tally = Tally::new(5);
        {
            let mut held = tally.hold();
            *held -= 2;
        }
        assert_eq!(tally.get(), 3);
    }

    #[test]
    fn test_context_keeps_first_fault() {
        let ctx = MachineContext::new(RoutingRegistry::new(), 10);
        assert_eq!(ctx.resident().get(), 10);
        assert_eq!(ctx.collected().get(), 0);
        assert!(!ctx.has_fault());

        let first = PipelineError::UnresolvableTag {
            router: RouterId::from("A"),
            tag: "x".to_string(),
            item_id: 1,
        };
        let second = PipelineError::UnresolvableTag {
            router: RouterId::from("B"),
            tag: "y".to_string(),
            item_id: 2,
        };
        ctx.raise(first.clone());
        ctx.raise(second);
        assert_eq!(ctx.fault(), Some(first));
    }
}
