//! Identity types for the processor network.
//!
//! Processor handles are newtypes over `u32` that index directly into the
//! network arena. Arena slots are never reused, so a handle to a removed
//! processor stays dead instead of silently aliasing a newer one.

use super::property::PropertyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the network's processor arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorId(pub u32);

impl ProcessorId {
    pub const INVALID: ProcessorId = ProcessorId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Handle for arena slot `index`, or `None` past the last usable one.
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .map(ProcessorId)
            .filter(|id| id.is_valid())
    }

    /// Handle of this processor's `index`-th outport.
    pub fn outport(self, index: usize) -> OutportId {
        OutportId::new(self, index)
    }

    /// Handle of this processor's `index`-th inport.
    pub fn inport(self, index: usize) -> InportId {
        InportId::new(self, index)
    }

    /// Handle of this processor's `index`-th property.
    pub fn property(self, index: usize) -> PropertyId {
        PropertyId::new(self, index)
    }
}

impl fmt::Debug for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ProcessorId(INVALID)")
        } else {
            write!(f, "ProcessorId({})", self.0)
        }
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A processor handle plus a port index within one direction.
///
/// The index is kept as given, so a handle built from an out-of-range index
/// stays out of range and lookups through the network fail instead of
/// landing on another port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId {
    processor: ProcessorId,
    index: usize,
}

impl PortId {
    pub fn new(processor: ProcessorId, index: usize) -> Self {
        Self { processor, index }
    }

    #[inline]
    pub fn processor(self) -> ProcessorId {
        self.processor
    }

    #[inline]
    pub fn port_index(self) -> usize {
        self.index
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PortId(processor={}, port={})",
            self.processor.0, self.index
        )
    }
}

/// Handle to an output port. Outports are indexed in declaration order,
/// separately from inports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutportId(pub PortId);

impl OutportId {
    pub fn new(processor: ProcessorId, index: usize) -> Self {
        Self(PortId::new(processor, index))
    }

    #[inline]
    pub fn processor(self) -> ProcessorId {
        self.0.processor()
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.port_index()
    }
}

impl fmt::Debug for OutportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Outport({}:{})", self.processor().0, self.index())
    }
}

impl fmt::Display for OutportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle to an input port (single or multi).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InportId(pub PortId);

impl InportId {
    pub fn new(processor: ProcessorId, index: usize) -> Self {
        Self(PortId::new(processor, index))
    }

    #[inline]
    pub fn processor(self) -> ProcessorId {
        self.0.processor()
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.port_index()
    }
}

impl fmt::Debug for InportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inport({}:{})", self.processor().0, self.index())
    }
}

impl fmt::Display for InportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
