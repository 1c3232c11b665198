//! Worker nodes. Each one runs on its own thread.

pub mod drainer;
pub mod producer;
pub mod router;

pub use drainer::{Drainer, DrainerHandle, DrainerStats};
pub use producer::{Producer, ProducerHandle, ProducerStats};
pub use router::{Router, RouterHandle, RouterPhase, RouterStats, TransitTiming};
