//! Router node: a four-port turntable that carries one item at a time from
//! an input buffer to the output leading to the item's sink.
//!
//! # Per-item cycle
//!
//! ```text
//! Idle ──take──► Resolving ──lookup──► Transiting ──deposit──► Idle
//!   └──────────────────── cancel ─────────────────────────► Stopped
//! ```
//!
//! While an item is between take and deposit the router services no other
//! port. The item is recorded in the router's slot for that whole span, so a
//! cancelled transit leaves it counted as on the machine.
//!
//! # Output map
//!
//! Built once at construction: every output-buffer port maps each sink
//! reachable through its buffer's tags, every output-sink port maps its own
//! sink. When two ports lead to the same sink the lower-numbered port wins.

use crate::error::{Result, SortError};
use crate::pipeline::context::MachineContext;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{PortIndex, RouterId, SinkId, PORT_COUNT};
use crate::pipeline::item::Item;
use crate::pipeline::port::Port;
use crate::pipeline::sync::{lock, CancellationToken};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed delays applied to every carried item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitTiming {
    /// Pulling an item onto the table.
    pub move_in: Duration,
    /// Turning the table when input and output ports are not aligned.
    pub rotate: Duration,
    /// Pushing an item off the table.
    pub move_out: Duration,
    /// Pause between passes that found every input empty.
    pub idle_poll: Duration,
}

impl Default for TransitTiming {
    fn default() -> Self {
        Self {
            move_in: Duration::from_millis(750),
            rotate: Duration::from_millis(500),
            move_out: Duration::from_millis(750),
            idle_poll: Duration::from_millis(5),
        }
    }
}

impl TransitTiming {
    /// No delays at all. Useful for tests.
    pub fn instant() -> Self {
        Self {
            move_in: Duration::ZERO,
            rotate: Duration::ZERO,
            move_out: Duration::ZERO,
            idle_poll: Duration::from_millis(1),
        }
    }

    /// Total transit time between two ports.
    pub fn transit_time(&self, input: PortIndex, output: PortIndex) -> Duration {
        let rotate = if input.needs_rotation_to(output) {
            self.rotate
        } else {
            Duration::ZERO
        };
        self.move_in + rotate + self.move_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouterPhase {
    Idle,
    Resolving,
    Transiting,
    Stopped,
}

struct RouterSlot {
    phase: RouterPhase,
    holding: Option<Item>,
    moved: u64,
}

/// Post-run figures for one router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterStats {
    pub id: RouterId,
    /// Items carried to an output.
    pub moved: u64,
    /// Whether an item is still on the table.
    pub holding: bool,
    pub phase: RouterPhase,
}

/// Read-only view of a router that outlives its thread.
#[derive(Clone)]
pub struct RouterHandle {
    id: RouterId,
    slot: Arc<Mutex<RouterSlot>>,
}

impl RouterHandle {
    pub fn id(&self) -> &RouterId {
        &self.id
    }

    pub fn stats(&self) -> RouterStats {
        let slot = lock(&self.slot);
        RouterStats {
            id: self.id.clone(),
            moved: slot.moved,
            holding: slot.holding.is_some(),
            phase: slot.phase,
        }
    }

    /// Item currently on the table, if any.
    pub fn holding(&self) -> Option<Item> {
        lock(&self.slot).holding.clone()
    }
}

pub struct Router {
    id: RouterId,
    ports: [Option<Port>; PORT_COUNT],
    output_map: HashMap<SinkId, PortIndex>,
    timing: TransitTiming,
    context: Arc<MachineContext>,
    slot: Arc<Mutex<RouterSlot>>,
}

impl Router {
    /// Bind `ports` and build the output map from the context's registry.
    ///
    /// Fails if an output buffer advertises a tag that no sink collects.
    pub fn new(
        id: RouterId,
        ports: [Option<Port>; PORT_COUNT],
        timing: TransitTiming,
        context: Arc<MachineContext>,
    ) -> Result<Self> {
        let mut output_map = HashMap::new();

        for index in PortIndex::all() {
            match &ports[index.index()] {
                Some(Port::OutputBuffer(buffer)) => {
                    for tag in buffer.reachable_tags() {
                        let sink = context.registry().resolve(tag).ok_or_else(|| {
                            SortError::config(format!(
                                "{id} port {index}: {} advertises tag {tag:?} but no sink collects it",
                                buffer.id()
                            ))
                        })?;
                        output_map.entry(sink).or_insert(index);
                    }
                }
                Some(Port::OutputSink(sink)) => {
                    output_map.entry(sink.id()).or_insert(index);
                }
                Some(Port::Input(_)) | None => {}
            }
        }

        tracing::debug!("{id} output map: {:?}", output_map);

        Ok(Self {
            id,
            ports,
            output_map,
            timing,
            context,
            slot: Arc::new(Mutex::new(RouterSlot {
                phase: RouterPhase::Idle,
                holding: None,
                moved: 0,
            })),
        })
    }

    pub fn id(&self) -> &RouterId {
        &self.id
    }

    /// Output port leading to `sink`, if any.
    pub fn output_port(&self, sink: SinkId) -> Option<PortIndex> {
        self.output_map.get(&sink).copied()
    }

    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            id: self.id.clone(),
            slot: Arc::clone(&self.slot),
        }
    }

    /// Service input ports until `cancel` fires or a routing defect occurs.
    ///
    /// A defect is also raised on the shared context so the machine can stop.
    pub fn run(self, cancel: CancellationToken) -> PipelineResult<RouterStats> {
        tracing::info!("{} started", self.id);

        let result = self.service(&cancel);

        lock(&self.slot).phase = RouterPhase::Stopped;
        let stats = self.handle().stats();
        match result {
            Ok(()) => {
                tracing::info!(
                    "{} stopped after moving {} items{}",
                    self.id,
                    stats.moved,
                    if stats.holding { " (item still on table)" } else { "" }
                );
                Ok(stats)
            }
            Err(err) => {
                self.context.raise(err.clone());
                Err(err)
            }
        }
    }

    fn service(&self, cancel: &CancellationToken) -> PipelineResult<()> {
        loop {
            let mut serviced = false;

            for index in PortIndex::all() {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let Some(Port::Input(buffer)) = &self.ports[index.index()] else {
                    continue;
                };
                if buffer.is_empty() {
                    continue;
                }
                let Some(item) = buffer.try_take() else {
                    continue;
                };

                serviced = true;
                if !self.carry(index, item, cancel)? {
                    return Ok(());
                }
            }

            if !serviced && cancel.sleep(self.timing.idle_poll).is_err() {
                return Ok(());
            }
        }
    }

    /// Carry one item from `input` to its output. Returns `false` if cancelled
    /// before the deposit completed.
    fn carry(&self, input: PortIndex, item: Item, cancel: &CancellationToken) -> PipelineResult<bool> {
        {
            let mut slot = lock(&self.slot);
            slot.phase = RouterPhase::Resolving;
            slot.holding = Some(item.clone());
        }

        let sink = self
            .context
            .registry()
            .resolve(item.tag())
            .ok_or_else(|| PipelineError::UnresolvableTag {
                router: self.id.clone(),
                tag: item.tag().to_string(),
                item_id: item.id(),
            })?;
        let output = self
            .output_port(sink)
            .ok_or_else(|| PipelineError::UnroutableSink {
                router: self.id.clone(),
                sink,
                tag: item.tag().to_string(),
            })?;

        lock(&self.slot).phase = RouterPhase::Transiting;
        tracing::trace!("{}: {:?} {} -> {} for {}", self.id, item, input, output, sink);

        if cancel.sleep(self.timing.transit_time(input, output)).is_err() {
            return Ok(false);
        }

        let deposited = match &self.ports[output.index()] {
            Some(Port::OutputSink(target)) => target.put(item, cancel),
            Some(Port::OutputBuffer(target)) => target.put(item, cancel),
            Some(Port::Input(_)) | None => {
                return Err(PipelineError::UnroutableSink {
                    router: self.id.clone(),
                    sink,
                    tag: item.tag().to_string(),
                })
            }
        };

        match deposited {
            Ok(()) => {
                let mut slot = lock(&self.slot);
                slot.holding = None;
                slot.moved += 1;
                slot.phase = RouterPhase::Idle;
                Ok(true)
            }
            Err(err) => {
                tracing::debug!("{} stopped mid-transit holding {:?}", self.id, err.item);
                Ok(false)
            }
        }
    }
}
