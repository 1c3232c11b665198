//! Router port bindings.
//!
//! Each router has [`PORT_COUNT`](crate::pipeline::id::PORT_COUNT) ports. A
//! bound port is a [`Port`], which carries its kind and its target together;
//! an unbound port is simply `None`.

use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::sink::Sink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a port is declared in the machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortKind {
    InputBuffer,
    OutputBuffer,
    OutputSink,
    #[default]
    None,
}

impl PortKind {
    /// Parse the short scenario notation (`ib`, `ob`, `os`, `null`).
    pub fn from_short(code: &str) -> Option<Self> {
        match code {
            "ib" => Some(PortKind::InputBuffer),
            "ob" => Some(PortKind::OutputBuffer),
            "os" => Some(PortKind::OutputSink),
            "null" | "none" => Some(PortKind::None),
            _ => None,
        }
    }
}

/// A port bound to its target.
#[derive(Clone)]
pub enum Port {
    Input(Arc<BoundedBuffer>),
    OutputBuffer(Arc<BoundedBuffer>),
    OutputSink(Arc<Sink>),
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input(buffer) => write!(f, "Input({})", buffer.id()),
            Port::OutputBuffer(buffer) => write!(f, "OutputBuffer({})", buffer.id()),
            Port::OutputSink(sink) => write!(f, "OutputSink({})", sink.id()),
        }
    }
}
