//! Thread-per-component sorting pipeline.
//!
//! Items flow from producers onto bounded buffers, are carried by routers to
//! further buffers or straight into sinks, and sinks are emptied by drainers.
//!
//! # Architecture
//!
//! ```text
//! [Producer] ──► [BoundedBuffer] ──► [Router] ──► [Sink] ◄── [Drainer]
//!                                        │
//!                                        └──► [BoundedBuffer] ──► [Router] ...
//! ```
//!
//! # Design
//!
//! - **One thread per worker**: every producer, router and drainer runs on
//!   its own named OS thread; [`executor::Machine`] only starts, samples,
//!   stops and joins them.
//! - **Monitor per container**: each buffer and sink guards its state with a
//!   `Mutex` and a `Condvar`; blocking calls take a [`CancellationToken`].
//! - **Two global tallies**: items still in producers and items collected in
//!   sinks, each behind its own lock and updated together with the owning
//!   component's counter.
//! - **Frozen registry**: the tag to sink map is filled at setup and read-only
//!   afterwards.
//! - **Events**: progress is published on a crossbeam channel so observers
//!   never touch component locks.

pub mod bridge;
pub mod buffer;
pub mod context;
pub mod error;
pub mod executor;
pub mod id;
pub mod item;
pub mod nodes;
pub mod port;
pub mod sink;
pub mod sync;

pub use bridge::{EventPublisher, MachineEvent, MachineObserver};
pub use buffer::BoundedBuffer;
pub use context::{MachineContext, RoutingRegistry, Tally};
pub use error::{PipelineError, PipelineResult, PutError, WaitError};
pub use executor::{Machine, MachineBuilder, RunTimes};
pub use id::{BufferId, DrainerId, PortIndex, ProducerId, RouterId, SinkId, PORT_COUNT};
pub use item::Item;
pub use port::{Port, PortKind};
pub use sink::{Sink, SinkStats};
pub use sync::CancellationToken;
