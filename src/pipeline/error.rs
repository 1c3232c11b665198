//! Pipeline-specific error types.

use crate::pipeline::id::{RouterId, SinkId};
use crate::pipeline::item::Item;
use thiserror::Error;

/// Why a blocking buffer or sink operation returned without completing.
///
/// Cancellation and timeout are reported separately so a worker can leave its
/// loop on the former and retry on the latter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    TimedOut,
}

/// A rejected `put`. The item is handed back so the caller still owns it.
#[derive(Error, Debug)]
#[error("put of {item:?} failed: {reason}")]
pub struct PutError {
    pub reason: WaitError,
    pub item: Item,
}

impl PutError {
    pub fn new(reason: WaitError, item: Item) -> Self {
        Self { reason, item }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason == WaitError::Cancelled
    }

    /// Recover the item that could not be placed.
    pub fn into_item(self) -> Item {
        self.item
    }
}

/// Run-time defects raised by routers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{router}: no sink is registered for tag {tag:?} (item #{item_id})")]
    UnresolvableTag {
        router: RouterId,
        tag: String,
        item_id: u64,
    },

    #[error("{router}: no output port leads to {sink} (tag {tag:?})")]
    UnroutableSink {
        router: RouterId,
        sink: SinkId,
        tag: String,
    },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
