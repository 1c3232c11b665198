//! # SortSim-RS: Concurrent Sorting Machine Simulator
//!
//! Simulates a sorting machine made of independent workers connected by
//! bounded buffers. Items preloaded into feed producers travel along
//! conveyor buffers, are routed by four-port turntables according to their
//! destination tag, and end up in collection sinks that drainers empty when
//! full. Every item is accounted for at shutdown.
//!
//! ## Architecture
//!
//! - **Pipeline**: buffers, sinks, the routing registry and the worker nodes
//!   (producers, routers, drainers), each worker on its own thread
//! - **Orchestrator**: [`Machine`] runs the pipeline for a fixed duration and
//!   shuts it down in order
//! - **Configuration**: topology loaded from TOML, JSON or the scenario text format
//! - **Communication**: Crossbeam channels carry progress events to observers
//!
//! ## Example
//!
//! ```ignore
//! use sortsim_rs::{config::MachineConfig, pipeline::bridge, MachineBuilder};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = MachineConfig::load("scenario1.txt")?;
//!     let (events, observer) = bridge::channel();
//!
//!     std::thread::spawn(move || {
//!         while let Some(event) = observer.recv() {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     let mut machine = MachineBuilder::new(config.clone()).with_events(events).build()?;
//!     let report = machine.start(config.duration())?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use config::MachineConfig;
pub use error::{Result, SortError};
pub use pipeline::{Machine, MachineBuilder, MachineEvent};
pub use report::RunReport;
pub use types::{ProgressSnapshot, Reconciliation};
