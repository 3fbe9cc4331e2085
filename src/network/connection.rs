use super::id::{InportId, OutportId, ProcessorId};
use std::fmt;

/// A directed link from an outport to an inport.
///
/// Connections are plain values: the network owns the authoritative list and
/// only creates or destroys entries while it is locked.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    outport: OutportId,
    inport: InportId,
}

impl Connection {
    pub fn new(outport: OutportId, inport: InportId) -> Self {
        Self { outport, inport }
    }

    pub fn outport(&self) -> OutportId {
        self.outport
    }

    pub fn inport(&self) -> InportId {
        self.inport
    }

    pub fn source(&self) -> ProcessorId {
        self.outport.processor()
    }

    pub fn target(&self) -> ProcessorId {
        self.inport.processor()
    }

    /// Touches `processor` on either end.
    pub fn involves(&self, processor: ProcessorId) -> bool {
        self.source() == processor || self.target() == processor
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.outport, self.inport)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
