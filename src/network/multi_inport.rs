//! Inports whose arity is decided at runtime.
//!
//! A [`MultiInport`] keeps one concrete [`Inport`] per connection. Losing a
//! connection produces no new data anywhere, so the port also remembers how
//! many members it had when its owner last consumed it; a differing live
//! count counts as a change.
//!
//! [`AnyInport`] wraps either kind so the graph can treat them uniformly.

use super::id::{InportId, OutportId};
use super::invalidation::InvalidationLevel;
use super::port::{DataType, Inport, PortArity, PortDescriptor};

#[derive(Debug, Clone)]
pub struct MultiInport {
    id: InportId,
    descriptor: PortDescriptor,
    inports: Vec<Inport>,
    remembered_count: usize,
}

impl MultiInport {
    pub fn new(id: InportId, descriptor: PortDescriptor) -> Self {
        Self {
            id,
            descriptor,
            inports: Vec::new(),
            remembered_count: 0,
        }
    }

    pub fn id(&self) -> InportId {
        self.id
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn max_connections(&self) -> usize {
        self.descriptor.max_connections()
    }

    pub fn connection_count(&self) -> usize {
        self.inports.len()
    }

    /// Members in connection order.
    pub fn inports(&self) -> &[Inport] {
        &self.inports
    }

    pub fn add(&mut self, inport: Inport) {
        self.inports.push(inport);
    }

    /// Removes the member fed by `outport`.
    pub fn remove(&mut self, outport: OutportId) -> Option<Inport> {
        let pos = self
            .inports
            .iter()
            .position(|port| port.is_connected_to(outport))?;
        Some(self.inports.remove(pos))
    }

    /// Creates a member for `outport`.
    pub fn connect_to(&mut self, outport: OutportId) {
        let mut member = Inport::new(self.id, self.descriptor);
        member.connect_to(outport);
        self.add(member);
    }

    pub fn is_connected(&self) -> bool {
        !self.inports.is_empty()
    }

    pub fn is_connected_to(&self, outport: OutportId) -> bool {
        self.inports.iter().any(|port| port.is_connected_to(outport))
    }

    /// No-op for an outport that is not connected.
    pub fn disconnect_from(&mut self, outport: OutportId) {
        self.remove(outport);
    }

    pub fn connected_outports(&self) -> Vec<OutportId> {
        self.inports
            .iter()
            .filter_map(Inport::connected_outport)
            .collect()
    }

    /// Outports whose member carries unconsumed data.
    pub fn changed_outports(&self) -> Vec<OutportId> {
        self.inports
            .iter()
            .filter(|port| port.is_changed())
            .filter_map(Inport::connected_outport)
            .collect()
    }

    pub fn is_changed(&self) -> bool {
        self.inports.len() != self.remembered_count
            || self.inports.iter().any(Inport::is_changed)
    }

    /// Clearing the flag also records the current arity as the baseline for
    /// structural change detection.
    pub fn set_changed(&mut self, changed: bool) {
        for port in &mut self.inports {
            port.set_changed(changed);
        }
        if !changed {
            self.remembered_count = self.inports.len();
        }
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.inports
            .iter()
            .map(Inport::invalidation_level)
            .fold(InvalidationLevel::Valid, InvalidationLevel::combine)
    }

    pub fn set_invalidation_level(&mut self, level: InvalidationLevel) {
        for port in &mut self.inports {
            port.set_invalidation_level(level);
        }
    }
}

// ==================== AnyInport ====================

/// Either inport flavour. The graph only ever talks to this type.
#[derive(Debug, Clone)]
pub enum AnyInport {
    Single(Inport),
    Multi(MultiInport),
}

impl AnyInport {
    pub(crate) fn from_descriptor(id: InportId, descriptor: PortDescriptor) -> Self {
        match descriptor.arity {
            PortArity::Single => AnyInport::Single(Inport::new(id, descriptor)),
            PortArity::Multi { .. } => AnyInport::Multi(MultiInport::new(id, descriptor)),
        }
    }

    pub fn id(&self) -> InportId {
        match self {
            AnyInport::Single(p) => p.id(),
            AnyInport::Multi(p) => p.id(),
        }
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        match self {
            AnyInport::Single(p) => p.descriptor(),
            AnyInport::Multi(p) => p.descriptor(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor().data_type
    }

    pub fn is_optional(&self) -> bool {
        self.descriptor().optional
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, AnyInport::Multi(_))
    }

    pub fn as_multi(&self) -> Option<&MultiInport> {
        match self {
            AnyInport::Multi(p) => Some(p),
            AnyInport::Single(_) => None,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.descriptor().max_connections()
    }

    pub fn connection_count(&self) -> usize {
        match self {
            AnyInport::Single(p) => usize::from(p.is_connected()),
            AnyInport::Multi(p) => p.connection_count(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_count() > 0
    }

    pub fn is_connected_to(&self, outport: OutportId) -> bool {
        match self {
            AnyInport::Single(p) => p.is_connected_to(outport),
            AnyInport::Multi(p) => p.is_connected_to(outport),
        }
    }

    pub fn connected_outports(&self) -> Vec<OutportId> {
        match self {
            AnyInport::Single(p) => p.connected_outport().into_iter().collect(),
            AnyInport::Multi(p) => p.connected_outports(),
        }
    }

    /// `(outport, changed)` for every connection, in connection order.
    pub fn connections_with_changes(&self) -> Vec<(OutportId, bool)> {
        match self {
            AnyInport::Single(p) => p
                .connected_outport()
                .map(|out| (out, p.is_changed()))
                .into_iter()
                .collect(),
            AnyInport::Multi(p) => p
                .inports()
                .iter()
                .filter_map(|m| m.connected_outport().map(|out| (out, m.is_changed())))
                .collect(),
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.connection_count() < self.max_connections()
    }

    pub fn is_changed(&self) -> bool {
        match self {
            AnyInport::Single(p) => p.is_changed(),
            AnyInport::Multi(p) => p.is_changed(),
        }
    }

    pub fn set_changed(&mut self, changed: bool) {
        match self {
            AnyInport::Single(p) => p.set_changed(changed),
            AnyInport::Multi(p) => p.set_changed(changed),
        }
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        match self {
            AnyInport::Single(p) => p.invalidation_level(),
            AnyInport::Multi(p) => p.invalidation_level(),
        }
    }

    pub(crate) fn connect_to(&mut self, outport: OutportId) {
        match self {
            AnyInport::Single(p) => p.connect_to(outport),
            AnyInport::Multi(p) => p.connect_to(outport),
        }
    }

    pub(crate) fn disconnect_from(&mut self, outport: OutportId) {
        match self {
            AnyInport::Single(p) => {
                p.disconnect_from(outport);
            }
            AnyInport::Multi(p) => p.disconnect_from(outport),
        }
    }

    /// Marks new data coming from `source`. On a multi inport only the member
    /// fed by `source` is touched.
    pub(crate) fn invalidate_from(&mut self, source: OutportId, level: InvalidationLevel) {
        match self {
            AnyInport::Single(p) => p.invalidate(level),
            AnyInport::Multi(p) => {
                if let Some(member) = p
                    .inports
                    .iter_mut()
                    .find(|m| m.is_connected_to(source))
                {
                    member.invalidate(level);
                }
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            AnyInport::Single(p) => p.reset(),
            AnyInport::Multi(p) => {
                p.set_changed(false);
                p.set_invalidation_level(InvalidationLevel::Valid);
            }
        }
    }
}
