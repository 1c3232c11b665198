//! Identity types for the sorting machine.
//!
//! Numeric ids are newtypes over `u32` matching the identifiers used in the
//! machine configuration. Routers are named with free-form strings instead.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a conveyor buffer.
    BufferId,
    "Belt"
);
numeric_id!(
    /// Identifier of a collection sink. Also the value stored in the routing registry.
    SinkId,
    "Sack"
);
numeric_id!(
    /// Identifier of a feed producer.
    ProducerId,
    "Hopper"
);
numeric_id!(
    /// Identifier of a sink drainer.
    DrainerId,
    "Elf"
);

/// Name of a routing turntable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterId(pub String);

impl RouterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterId({:?})", self.0)
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Turntable {}", self.0)
    }
}

impl From<&str> for RouterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Number of ports around every router.
pub const PORT_COUNT: usize = 4;

/// Position of a port around a router, numbered clockwise from north.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortIndex(u8);

impl PortIndex {
    pub const NORTH: PortIndex = PortIndex(0);
    pub const EAST: PortIndex = PortIndex(1);
    pub const SOUTH: PortIndex = PortIndex(2);
    pub const WEST: PortIndex = PortIndex(3);

    /// Returns `None` for indices outside `0..PORT_COUNT`.
    pub fn new(index: usize) -> Option<Self> {
        (index < PORT_COUNT).then_some(PortIndex(index as u8))
    }

    /// Parse a compass direction (`N`, `E`, `S`, `W`).
    pub fn from_compass(direction: &str) -> Option<Self> {
        match direction {
            "N" | "n" => Some(Self::NORTH),
            "E" | "e" => Some(Self::EAST),
            "S" | "s" => Some(Self::SOUTH),
            "W" | "w" => Some(Self::WEST),
            _ => None,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every port position in order.
    pub fn all() -> impl Iterator<Item = PortIndex> {
        (0..PORT_COUNT as u8).map(PortIndex)
    }

    /// Whether carrying an item from `self` to `other` needs the table to turn.
    ///
    /// Opposite and identical ports are aligned; adjacent ports are not.
    #[inline]
    pub fn needs_rotation_to(self, other: PortIndex) -> bool {
        self.0.abs_diff(other.0) % 2 == 1
    }

    pub fn compass(self) -> char {
        ['N', 'E', 'S', 'W'][self.index()]
    }
}

impl fmt::Debug for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortIndex({})", self.compass())
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compass())
    }
}
