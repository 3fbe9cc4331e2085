//! Ports: the typed endpoints processors expose to the network.
//!
//! Each processor declares its ports via a static `PortDescriptor` array.
//! The network instantiates an [`Outport`] or an inport for every descriptor
//! and uses the data type tags to validate connections.

use super::id::{InportId, OutportId};
use super::invalidation::InvalidationLevel;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value held by an outport. Shared so downstream readers can keep a
/// snapshot alive while a newer value is produced.
pub type PortData = Arc<dyn Any + Send + Sync>;

/// Tag naming the kind of data a port carries.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType(&'static str);

impl DataType {
    /// Accepted by inports that take any data.
    pub const ANY: DataType = DataType("*");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }

    /// Whether an inport of this type accepts data from an outport of `source`.
    pub fn accepts(self, source: DataType) -> bool {
        self == Self::ANY || self == source
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.0)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// How many connections an inport takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortArity {
    Single,
    /// Aggregates any number of connections up to `max`.
    Multi { max: usize },
}

/// Static descriptor for a processor's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub data_type: DataType,
    pub arity: PortArity,
    /// An unconnected optional inport does not block readiness.
    pub optional: bool,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            data_type,
            arity: PortArity::Single,
            optional: false,
        }
    }

    pub const fn multi_input(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            data_type,
            arity: PortArity::Multi { max: usize::MAX },
            optional: false,
        }
    }

    pub const fn output(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            data_type,
            arity: PortArity::Single,
            optional: false,
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    pub const fn with_max_connections(self, max: usize) -> Self {
        Self {
            arity: PortArity::Multi { max },
            ..self
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    pub fn max_connections(&self) -> usize {
        match self.arity {
            PortArity::Single => 1,
            PortArity::Multi { max } => max,
        }
    }
}

// ==================== Outport ====================

/// Produces values. Owns the most recent value and its version counter.
#[derive(Clone)]
pub struct Outport {
    id: OutportId,
    descriptor: PortDescriptor,
    data: Option<PortData>,
    version: u64,
    level: InvalidationLevel,
    connected: Vec<InportId>,
}

impl Outport {
    /// A fresh outport holds no data and starts out invalid.
    pub fn new(id: OutportId, descriptor: PortDescriptor) -> Self {
        Self {
            id,
            descriptor,
            data: None,
            version: 0,
            level: InvalidationLevel::InvalidOutput,
            connected: Vec::new(),
        }
    }

    pub fn id(&self) -> OutportId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn data(&self) -> Option<&PortData> {
        self.data.as_ref()
    }

    /// Typed view of the current value.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Incremented every time a new value is stored.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.level
    }

    /// Holds data and is not waiting on a recompute.
    pub fn is_ready(&self) -> bool {
        self.has_data() && self.level.is_valid()
    }

    pub fn connected_inports(&self) -> &[InportId] {
        &self.connected
    }

    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub(crate) fn set_data(&mut self, data: PortData) {
        self.data = Some(data);
        self.version += 1;
    }

    /// Raises the port level. Propagation to connected inports is done by the
    /// graph, which can reach the downstream processors.
    pub(crate) fn invalidate(&mut self, level: InvalidationLevel) {
        self.level.raise(level);
    }

    pub(crate) fn reset(&mut self) {
        self.level = InvalidationLevel::Valid;
    }

    pub(crate) fn attach(&mut self, inport: InportId) {
        if !self.connected.contains(&inport) {
            self.connected.push(inport);
        }
    }

    pub(crate) fn detach(&mut self, inport: InportId) {
        self.connected.retain(|&id| id != inport);
    }
}

impl fmt::Debug for Outport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outport")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("has_data", &self.data.is_some())
            .field("version", &self.version)
            .field("level", &self.level)
            .field("connected", &self.connected)
            .finish()
    }
}

// ==================== Inport ====================

/// Consumes values from at most one outport.
#[derive(Debug, Clone)]
pub struct Inport {
    id: InportId,
    descriptor: PortDescriptor,
    connection: Option<OutportId>,
    changed: bool,
    level: InvalidationLevel,
}

impl Inport {
    pub fn new(id: InportId, descriptor: PortDescriptor) -> Self {
        Self {
            id,
            descriptor,
            connection: None,
            changed: false,
            level: InvalidationLevel::Valid,
        }
    }

    pub fn id(&self) -> InportId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn is_optional(&self) -> bool {
        self.descriptor.optional
    }

    pub fn connected_outport(&self) -> Option<OutportId> {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_connected_to(&self, outport: OutportId) -> bool {
        self.connection == Some(outport)
    }

    /// New data arrived (or the connection changed) since the owner last
    /// finished a successful `process()`.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.level
    }

    /// Connecting counts as a change: the consumer has not seen this source yet.
    pub fn connect_to(&mut self, outport: OutportId) {
        self.connection = Some(outport);
        self.changed = true;
        self.level.raise(InvalidationLevel::InvalidOutput);
    }

    /// Returns false if the port was not connected to `outport`.
    pub fn disconnect_from(&mut self, outport: OutportId) -> bool {
        if self.connection != Some(outport) {
            return false;
        }
        self.connection = None;
        self.changed = true;
        self.level.raise(InvalidationLevel::InvalidOutput);
        true
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub fn set_invalidation_level(&mut self, level: InvalidationLevel) {
        self.level = level;
    }

    pub fn invalidate(&mut self, level: InvalidationLevel) {
        self.level.raise(level);
        self.changed = true;
    }

    /// Marks the current input as consumed.
    pub fn reset(&mut self) {
        self.level = InvalidationLevel::Valid;
        self.changed = false;
    }
}
