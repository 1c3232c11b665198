//! Machine orchestrator: builds the component graph and runs it.
//!
//! A run goes through these phases:
//! 1. Spawn one named thread per router, drainer and producer.
//! 2. Sample progress until the configured duration expires.
//! 3. Stop the producers and join them.
//! 4. Wait until every item that left a producer has reached a sink.
//! 5. Stop routers and drainers and join them.
//!
//! The orchestrating thread never touches items. It only reads the two
//! global tallies while running, and the per-component counters after every
//! thread has joined.

use crate::config::{MachineConfig, PortConfig, TimingConfig};
use crate::error::{Result, ResultExt, SortError};
use crate::pipeline::bridge::{EventPublisher, MachineEvent};
use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::context::{MachineContext, RoutingRegistry};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::{BufferId, SinkId, PORT_COUNT};
use crate::pipeline::item::Item;
use crate::pipeline::nodes::{
    Drainer, DrainerHandle, DrainerStats, Producer, ProducerHandle, ProducerStats, Router,
    RouterHandle, RouterStats,
};
use crate::pipeline::port::{Port, PortKind};
use crate::pipeline::sink::{Sink, SinkStats};
use crate::pipeline::sync::{deadline_after, CancellationToken};
use crate::report::RunReport;
use crate::types::{ProgressSnapshot, Reconciliation};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the orchestrator looks at the tallies and the fault slot.
const SUPERVISOR_POLL: Duration = Duration::from_millis(10);

/// Worker nodes built but not yet running.
struct Workers {
    producers: Vec<Producer>,
    routers: Vec<Router>,
    drainers: Vec<Drainer>,
}

/// Join handles for a running machine.
#[derive(Default)]
struct Running {
    producers: Vec<JoinHandle<ProducerStats>>,
    routers: Vec<JoinHandle<PipelineResult<RouterStats>>>,
    drainers: Vec<JoinHandle<DrainerStats>>,
}

impl Running {
    /// Routers first so they are already waiting when the first item lands,
    /// then drainers, then producers.
    fn spawn(
        workers: Workers,
        input_stop: &CancellationToken,
        machine_stop: &CancellationToken,
    ) -> Result<Self> {
        let mut running = Running::default();

        if let Err(err) = running.spawn_all(workers, input_stop, machine_stop) {
            tracing::error!("Failed to spawn worker threads: {}", err);
            input_stop.cancel();
            machine_stop.cancel();
            let _ = running.join();
            return Err(err);
        }
        Ok(running)
    }

    fn spawn_all(
        &mut self,
        workers: Workers,
        input_stop: &CancellationToken,
        machine_stop: &CancellationToken,
    ) -> Result<()> {
        for router in workers.routers {
            let token = machine_stop.clone();
            let name = format!("router-{}", router.id().as_str());
            self.routers
                .push(thread::Builder::new().name(name).spawn(move || router.run(token))?);
        }
        for drainer in workers.drainers {
            let token = machine_stop.clone();
            let name = format!("drainer-{}", drainer.id().get());
            self.drainers
                .push(thread::Builder::new().name(name).spawn(move || drainer.run(token))?);
        }
        for producer in workers.producers {
            let token = input_stop.clone();
            let name = format!("producer-{}", producer.id().get());
            self.producers
                .push(thread::Builder::new().name(name).spawn(move || producer.run(token))?);
        }
        Ok(())
    }

    fn join_producers(&mut self) -> Result<()> {
        join_all(std::mem::take(&mut self.producers))
    }

    /// Join everything still running, reporting the first panic.
    fn join(&mut self) -> Result<()> {
        let producers = join_all(std::mem::take(&mut self.producers));
        let routers = join_all(std::mem::take(&mut self.routers));
        let drainers = join_all(std::mem::take(&mut self.drainers));
        producers.and(routers).and(drainers)
    }
}

fn join_all<T>(handles: Vec<JoinHandle<T>>) -> Result<()> {
    let mut panicked = None;
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            tracing::error!("{} panicked", name);
            panicked.get_or_insert(name);
        }
    }
    match panicked {
        Some(name) => Err(SortError::ThreadPanicked(name)),
        None => Ok(()),
    }
}

/// Timing of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimes {
    /// From start until producers were stopped and joined.
    pub input_stopped: Duration,
    /// From start until every thread joined.
    pub total: Duration,
    /// Whether every deposited item reached a sink before shutdown.
    pub drained: bool,
}

/// A built sorting machine.
///
/// A machine runs once. Its counters stay readable after the run.
pub struct Machine {
    timing: TimingConfig,
    context: Arc<MachineContext>,
    buffers: Vec<Arc<BoundedBuffer>>,
    sinks: Vec<Arc<Sink>>,
    producers: Vec<ProducerHandle>,
    routers: Vec<RouterHandle>,
    drainers: Vec<DrainerHandle>,
    workers: Option<Workers>,
    events: EventPublisher,
    started_at: Option<Instant>,
    times: Option<RunTimes>,
}

impl Machine {
    /// Build a machine from a configuration with no event observer.
    pub fn from_config(config: &MachineConfig) -> Result<Self> {
        MachineBuilder::new(config.clone()).build()
    }

    /// Run for `duration`, then shut down and report.
    ///
    /// Fails with [`SortError::AlreadyRun`] on a second call, with
    /// [`SortError::Config`] if `duration` cannot be represented as a deadline,
    /// with
    /// [`SortError::Pipeline`] if a router hit a routing defect, and with
    /// [`SortError::ThreadPanicked`] if any worker panicked. Every thread has
    /// been joined by the time this returns, whatever the outcome.
    pub fn start(&mut self, duration: Duration) -> Result<RunReport> {
        if self.workers.is_none() {
            return Err(SortError::AlreadyRun);
        }
        if deadline_after(duration).is_none() {
            return Err(SortError::config(format!(
                "Run duration of {}s is too long",
                duration.as_secs()
            )));
        }
        let workers = self.workers.take().ok_or(SortError::AlreadyRun)?;
        let counts = (
            workers.producers.len(),
            workers.routers.len(),
            workers.drainers.len(),
        );

        let input_stop = CancellationToken::new();
        let machine_stop = CancellationToken::new();
        let started = Instant::now();
        self.started_at = Some(started);

        let mut running = Running::spawn(workers, &input_stop, &machine_stop)?;
        tracing::info!(
            "Machine started: {} producers, {} routers, {} drainers, {} items loaded",
            counts.0,
            counts.1,
            counts.2,
            self.total_loaded()
        );
        self.events.publish(MachineEvent::Started {
            producers: counts.0,
            routers: counts.1,
            drainers: counts.2,
        });

        self.supervise(started, duration);

        input_stop.cancel();
        let producers_joined = running.join_producers();
        let input_stopped = started.elapsed();
        tracing::info!("Input stopped after {:.1}s", input_stopped.as_secs_f64());
        self.events.publish(MachineEvent::InputStopped {
            elapsed: input_stopped,
        });

        let drained = !self.context.has_fault() && self.await_drain();
        self.events.publish(MachineEvent::Drained {
            elapsed: started.elapsed(),
            complete: drained,
        });

        machine_stop.cancel();
        let rest_joined = running.join();
        let total = started.elapsed();
        let times = RunTimes {
            input_stopped,
            total,
            drained,
        };
        self.times = Some(times);

        let fault = self.context.fault();
        if let Some(fault) = &fault {
            self.events.publish(MachineEvent::Fault(fault.to_string()));
        }
        tracing::info!("Machine completed shutdown after {:.1}s", total.as_secs_f64());
        self.events.publish(MachineEvent::Shutdown { elapsed: total });
        let dropped = self.events.dropped();
        if dropped > 0 {
            tracing::warn!("{} events dropped because the observer fell behind", dropped);
        }

        producers_joined.and(rest_joined)?;
        if let Some(fault) = fault {
            return Err(SortError::Pipeline(fault));
        }

        let report = RunReport::from_machine(self, times);
        let reconciliation = &report.reconciliation;
        if reconciliation.is_balanced() {
            tracing::info!(
                "{} items loaded: {} on the machine, {} in sinks",
                reconciliation.loaded,
                reconciliation.on_machine(),
                reconciliation.in_sinks
            );
        } else {
            tracing::warn!("{} items went missing", reconciliation.missing);
        }
        Ok(report)
    }

    /// Sample progress until `duration` has elapsed or a fault is raised.
    fn supervise(&self, started: Instant, duration: Duration) {
        let deadline = started.checked_add(duration);
        let interval = self.timing.sample_interval();
        let mut next_sample = started + interval;

        loop {
            if self.context.has_fault() {
                tracing::warn!("Fault raised, stopping input early");
                return;
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return;
            }
            if now >= next_sample {
                let snapshot = self.snapshot();
                tracing::info!(
                    "Interim report @ {}s: {} items remaining in producers, {} sorted into sinks",
                    snapshot.elapsed.as_secs(),
                    snapshot.in_producers,
                    snapshot.collected
                );
                self.events.publish(MachineEvent::Progress(snapshot));
                next_sample += interval;
            }
            let wake = deadline.map_or(next_sample, |d| next_sample.min(d));
            thread::sleep(wake.saturating_duration_since(now).min(SUPERVISOR_POLL));
        }
    }

    /// Wait until `loaded - resident == collected`.
    ///
    /// Only meaningful once producers have stopped depositing. Bounded by the
    /// configured drain timeout; returns whether the condition was reached.
    fn await_drain(&self) -> bool {
        let loaded = self.total_loaded();
        let deadline = self.timing.drain_timeout().and_then(deadline_after);

        loop {
            let resident = self.context.resident().get();
            let collected = self.context.collected().get();
            if loaded - resident == collected {
                tracing::debug!("All {} deposited items reached sinks", collected);
                return true;
            }
            if self.context.has_fault() {
                return false;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(
                    "Gave up waiting for {} items still in transit",
                    (loaded - resident).saturating_sub(collected)
                );
                return false;
            }
            thread::sleep(SUPERVISOR_POLL);
        }
    }

    /// Number of items preloaded into producers at setup.
    pub fn total_loaded(&self) -> u64 {
        self.context.loaded()
    }

    pub fn has_run(&self) -> bool {
        self.workers.is_none()
    }

    /// Timing of the completed run, if any.
    pub fn run_times(&self) -> Option<RunTimes> {
        self.times
    }

    pub fn context(&self) -> &Arc<MachineContext> {
        &self.context
    }

    /// Aggregate sample from the two global tallies only.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            elapsed: self.started_at.map(|s| s.elapsed()).unwrap_or_default(),
            in_producers: self.context.resident().get(),
            collected: self.context.collected().get(),
        }
    }

    pub fn producer_stats(&self) -> Vec<ProducerStats> {
        self.producers.iter().map(ProducerHandle::stats).collect()
    }

    pub fn buffer_counts(&self) -> Vec<(BufferId, usize)> {
        self.buffers.iter().map(|b| (b.id(), b.len())).collect()
    }

    pub fn router_stats(&self) -> Vec<RouterStats> {
        self.routers.iter().map(RouterHandle::stats).collect()
    }

    pub fn sink_stats(&self) -> Vec<(SinkId, SinkStats)> {
        self.sinks.iter().map(|s| (s.id(), s.stats())).collect()
    }

    pub fn drainer_stats(&self) -> Vec<DrainerStats> {
        self.drainers.iter().map(DrainerHandle::stats).collect()
    }

    pub fn buffers(&self) -> &[Arc<BoundedBuffer>] {
        &self.buffers
    }

    pub fn sinks(&self) -> &[Arc<Sink>] {
        &self.sinks
    }

    /// Account for every loaded item.
    ///
    /// Exact once every thread has joined; while running the parts are read
    /// at slightly different moments.
    pub fn reconciliation(&self) -> Reconciliation {
        let in_producers = self.producers.iter().map(|p| p.remaining() as u64).sum();
        let in_buffers = self.buffers.iter().map(|b| b.len() as u64).sum();
        let in_routers = self
            .routers
            .iter()
            .filter(|r| r.holding().is_some())
            .count() as u64;
        Reconciliation::new(
            self.total_loaded(),
            in_producers,
            in_buffers,
            in_routers,
            self.context.collected().get(),
        )
    }
}

/// Builds a [`Machine`] from a [`MachineConfig`].
pub struct MachineBuilder {
    config: MachineConfig,
    events: EventPublisher,
}

impl MachineBuilder {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            events: EventPublisher::disabled(),
        }
    }

    /// Publish run events through `events`.
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// Validate the configuration and wire every component.
    ///
    /// All setup errors surface here, before any thread exists.
    pub fn build(self) -> Result<Machine> {
        let config = self.config;
        config.validate()?;

        let mut registry = RoutingRegistry::new();
        for sink in &config.sinks {
            registry.register(sink.tag.clone(), sink.id).map_err(|existing| {
                SortError::config(format!(
                    "Tag {:?} is already collected by {}",
                    sink.tag, existing
                ))
            })?;
        }

        let context = Arc::new(MachineContext::new(registry, config.total_items()));

        let buffers: Vec<Arc<BoundedBuffer>> = config
            .buffers
            .iter()
            .map(|b| Arc::new(BoundedBuffer::new(b.id, b.capacity, b.reachable_tags.iter())))
            .collect();
        let buffer_map: HashMap<BufferId, Arc<BoundedBuffer>> =
            buffers.iter().map(|b| (b.id(), Arc::clone(b))).collect();

        let sinks: Vec<Arc<Sink>> = config
            .sinks
            .iter()
            .map(|s| Arc::new(Sink::new(s.id, s.capacity, s.tag.clone(), Arc::clone(&context))))
            .collect();
        let sink_map: HashMap<SinkId, Arc<Sink>> =
            sinks.iter().map(|s| (s.id(), Arc::clone(s))).collect();

        let lookup_buffer = |id: BufferId| -> Result<Arc<BoundedBuffer>> {
            buffer_map
                .get(&id)
                .cloned()
                .ok_or_else(|| SortError::config(format!("{id} is not declared")))
        };
        let lookup_sink = |id: SinkId| -> Result<Arc<Sink>> {
            sink_map
                .get(&id)
                .cloned()
                .ok_or_else(|| SortError::config(format!("{id} is not declared")))
        };

        let mut next_item = 0u64;
        let mut producers = Vec::with_capacity(config.producers.len());
        for p in &config.producers {
            let items = p
                .items
                .iter()
                .map(|tag| {
                    let item = Item::new(next_item, tag.as_str());
                    next_item += 1;
                    item
                })
                .collect();
            producers.push(Producer::new(
                p.id,
                lookup_buffer(p.buffer)?,
                p.capacity,
                p.rate,
                items,
                Arc::clone(&context),
            )?);
        }

        let transit = config.timing.transit();
        let mut routers = Vec::with_capacity(config.routers.len());
        for r in &config.routers {
            let mut ports: [Option<Port>; PORT_COUNT] = Default::default();
            for (slot, spec) in ports.iter_mut().zip(r.ports.iter()) {
                *slot = bind_port(spec, &lookup_buffer, &lookup_sink)?;
            }
            routers.push(
                Router::new(r.id.clone(), ports, transit, Arc::clone(&context))
                    .with_context(|| format!("Failed to bind {}", r.id))?,
            );
        }

        let mut drainers = Vec::with_capacity(config.drainers.len());
        for d in &config.drainers {
            let assigned = d
                .sinks
                .iter()
                .map(|id| lookup_sink(*id))
                .collect::<Result<Vec<_>>>()?;
            drainers.push(Drainer::new(
                d.id,
                assigned,
                config.timing.drain_wait(),
                self.events.clone(),
            ));
        }

        tracing::debug!("Built machine: {}", crate::config::summary(&config));

        Ok(Machine {
            timing: config.timing,
            context,
            producers: producers.iter().map(Producer::handle).collect(),
            routers: routers.iter().map(Router::handle).collect(),
            drainers: drainers.iter().map(Drainer::handle).collect(),
            buffers,
            sinks,
            workers: Some(Workers {
                producers,
                routers,
                drainers,
            }),
            events: self.events,
            started_at: None,
            times: None,
        })
    }
}

fn bind_port(
    spec: &PortConfig,
    buffer: &impl Fn(BufferId) -> Result<Arc<BoundedBuffer>>,
    sink: &impl Fn(SinkId) -> Result<Arc<Sink>>,
) -> Result<Option<Port>> {
    let Some(target) = spec.target else {
        return Ok(None);
    };
    Ok(match spec.role {
        PortKind::InputBuffer => Some(Port::Input(buffer(BufferId(target))?)),
        PortKind::OutputBuffer => Some(Port::OutputBuffer(buffer(BufferId(target))?)),
        PortKind::OutputSink => Some(Port::OutputSink(sink(SinkId(target))?)),
        PortKind::None => None,
    })
}
