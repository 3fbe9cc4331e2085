//! Arena storage for processors and connections.
//!
//! `Graph` is the plain data half of a `ProcessorNetwork`: it knows how to
//! wire ports together and how invalidation flows along connections, but has
//! no notion of locking, observers or evaluation passes. The evaluator works
//! directly on a `&mut Graph`.

use super::connection::Connection;
use super::context::{InportState, InputSource, InputView};
use super::error::{NetworkError, NetworkResult};
use super::id::{InportId, OutportId, ProcessorId};
use super::invalidation::InvalidationLevel;
use super::multi_inport::AnyInport;
use super::port::Outport;
use super::processor::ProcessorSlot;
use std::collections::{HashSet, VecDeque};

#[derive(Default)]
pub struct Graph {
    slots: Vec<Option<ProcessorSlot>>,
    connections: Vec<Connection>,
    /// Bumped on every topology change.
    generation: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.slot(id).is_some()
    }

    pub fn slot(&self, id: ProcessorId) -> Option<&ProcessorSlot> {
        self.slots.get(id.index())?.as_ref()
    }

    pub(crate) fn slot_mut(&mut self, id: ProcessorId) -> Option<&mut ProcessorSlot> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Live processors in registration order.
    pub fn processors(&self) -> impl Iterator<Item = &ProcessorSlot> {
        self.slots.iter().flatten()
    }

    pub fn processor_ids(&self) -> Vec<ProcessorId> {
        self.processors().map(ProcessorSlot::id).collect()
    }

    /// Connections in the order they were made.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// One `(source, target)` pair per connection.
    pub fn edges(&self) -> Vec<(ProcessorId, ProcessorId)> {
        self.connections
            .iter()
            .map(|c| (c.source(), c.target()))
            .collect()
    }

    pub fn outport(&self, id: OutportId) -> Option<&Outport> {
        self.slot(id.processor())?.outports.get(id.index())
    }

    pub fn inport(&self, id: InportId) -> Option<&AnyInport> {
        self.slot(id.processor())?.inports.get(id.index())
    }

    fn outport_mut(&mut self, id: OutportId) -> Option<&mut Outport> {
        self.slot_mut(id.processor())?.outports.get_mut(id.index())
    }

    fn inport_mut(&mut self, id: InportId) -> Option<&mut AnyInport> {
        self.slot_mut(id.processor())?.inports.get_mut(id.index())
    }

    // ── Processors ──

    /// Handle the next inserted processor will get. Handles are never
    /// reused, so the arena runs out once every `u32` below
    /// `ProcessorId::INVALID` has been handed out.
    pub(crate) fn next_id(&self) -> NetworkResult<ProcessorId> {
        ProcessorId::from_index(self.slots.len())
            .ok_or(NetworkError::ProcessorLimit(self.slots.len()))
    }

    pub(crate) fn insert(&mut self, slot: ProcessorSlot) -> ProcessorId {
        let id = slot.id();
        debug_assert_eq!(Ok(id), self.next_id());
        self.slots.push(Some(slot));
        self.generation += 1;
        id
    }

    /// Removes the slot. Callers detach its connections first.
    pub(crate) fn take(&mut self, id: ProcessorId) -> Option<ProcessorSlot> {
        let slot = self.slots.get_mut(id.index())?.take()?;
        self.generation += 1;
        Some(slot)
    }

    // ── Connections ──

    pub fn is_connected(&self, outport: OutportId, inport: InportId) -> bool {
        self.connections
            .iter()
            .any(|c| c.outport() == outport && c.inport() == inport)
    }

    pub fn connections_of(&self, processor: ProcessorId) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|c| c.involves(processor))
            .copied()
            .collect()
    }

    pub(crate) fn check_connection(&self, outport: OutportId, inport: InportId) -> NetworkResult<()> {
        let connection = Connection::new(outport, inport);
        let source = self
            .outport(outport)
            .ok_or(NetworkError::UnknownPort(outport.0))?;
        let target = self
            .inport(inport)
            .ok_or(NetworkError::UnknownPort(inport.0))?;

        if !target.data_type().accepts(source.data_type()) {
            return Err(NetworkError::IncompatibleConnection {
                connection,
                reason: format!(
                    "inport '{}' takes {}, outport '{}' produces {}",
                    target.name(),
                    target.data_type(),
                    source.name(),
                    source.data_type()
                ),
            });
        }

        if !target.has_free_slot() {
            let reason = if target.is_multi() {
                format!(
                    "inport '{}' is full ({} connections)",
                    target.name(),
                    target.max_connections()
                )
            } else {
                format!("inport '{}' is already connected", target.name())
            };
            return Err(NetworkError::IncompatibleConnection { connection, reason });
        }

        Ok(())
    }

    pub(crate) fn connect(&mut self, outport: OutportId, inport: InportId) -> NetworkResult<Connection> {
        self.check_connection(outport, inport)?;
        if let Some(port) = self.outport_mut(outport) {
            port.attach(inport);
        }
        if let Some(port) = self.inport_mut(inport) {
            port.connect_to(outport);
        }
        let connection = Connection::new(outport, inport);
        self.connections.push(connection);
        self.generation += 1;
        Ok(connection)
    }

    pub(crate) fn disconnect(&mut self, outport: OutportId, inport: InportId) -> Option<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.outport() == outport && c.inport() == inport)?;
        let connection = self.connections.remove(pos);
        if let Some(port) = self.outport_mut(outport) {
            port.detach(inport);
        }
        if let Some(port) = self.inport_mut(inport) {
            port.disconnect_from(outport);
        }
        self.generation += 1;
        Some(connection)
    }

    // ── Neighbourhood ──

    pub fn direct_successors(&self, processor: ProcessorId) -> Vec<ProcessorId> {
        let mut out: Vec<_> = self
            .connections
            .iter()
            .filter(|c| c.source() == processor)
            .map(Connection::target)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn direct_predecessors(&self, processor: ProcessorId) -> Vec<ProcessorId> {
        let mut out: Vec<_> = self
            .connections
            .iter()
            .filter(|c| c.target() == processor)
            .map(Connection::source)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    // ── Invalidation ──

    /// Raises `origin` to `level` and pushes `InvalidOutput` through every
    /// outport to the consumers downstream. Each processor propagates at most
    /// once, so cyclic wiring terminates.
    pub(crate) fn invalidate(&mut self, origin: ProcessorId, level: InvalidationLevel) {
        if level.is_valid() {
            return;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(origin, level)]);

        while let Some((id, level)) = queue.pop_front() {
            let Some(slot) = self.slot_mut(id) else {
                continue;
            };
            slot.raise(level);
            if !visited.insert(id) {
                continue;
            }

            let mut downstream = Vec::new();
            for port in &mut slot.outports {
                port.invalidate(InvalidationLevel::InvalidOutput);
                let source = port.id();
                downstream.extend(port.connected_inports().iter().map(|&inport| (source, inport)));
            }

            for (source, inport) in downstream {
                if let Some(port) = self.inport_mut(inport) {
                    port.invalidate_from(source, InvalidationLevel::InvalidOutput);
                    queue.push_back((inport.processor(), InvalidationLevel::InvalidOutput));
                }
            }
        }
    }

    // ── Evaluation snapshots ──

    pub(crate) fn inport_states(&self, processor: ProcessorId) -> Vec<InportState> {
        let Some(slot) = self.slot(processor) else {
            return Vec::new();
        };
        slot.inports
            .iter()
            .map(|port| {
                let sources = port.connected_outports();
                let ready = !sources.is_empty()
                    && sources
                        .iter()
                        .all(|&out| self.outport(out).is_some_and(Outport::is_ready));
                InportState {
                    name: port.name(),
                    optional: port.is_optional(),
                    connections: sources.len(),
                    ready,
                    changed: port.is_changed(),
                }
            })
            .collect()
    }

    pub(crate) fn gather_inputs(&self, processor: ProcessorId) -> Vec<InputView> {
        let Some(slot) = self.slot(processor) else {
            return Vec::new();
        };
        slot.inports
            .iter()
            .map(|port| InputView {
                name: port.name(),
                sources: port
                    .connections_with_changes()
                    .into_iter()
                    .map(|(outport, changed)| {
                        let source = self.outport(outport);
                        InputSource {
                            outport,
                            data: source.and_then(|p| p.data().cloned()),
                            version: source.map_or(0, Outport::version),
                            changed,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    // ── Integrity ──

    /// Every connection must join two live, mutually attached ports.
    pub fn validate(&self) -> NetworkResult<()> {
        for connection in &self.connections {
            let outport = self.outport(connection.outport()).ok_or_else(|| {
                NetworkError::DanglingReference(format!("{connection}: source port is gone"))
            })?;
            let inport = self.inport(connection.inport()).ok_or_else(|| {
                NetworkError::DanglingReference(format!("{connection}: target port is gone"))
            })?;
            if !outport.connected_inports().contains(&connection.inport())
                || !inport.is_connected_to(connection.outport())
            {
                return Err(NetworkError::DanglingReference(format!(
                    "{connection}: ports disagree about the link"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::context::ProcessContext;
    use crate::network::error::ProcessorError;
    use crate::network::port::{DataType, PortDescriptor};
    use crate::network::processor::Processor;

    const SCALAR: DataType = DataType::new("f64");
    const TEXT: DataType = DataType::new("text");

    struct Stub(&'static [PortDescriptor]);

    impl Processor for Stub {
        fn display_name(&self) -> &str {
            "Stub"
        }
        fn ports(&self) -> &[PortDescriptor] {
            self.0
        }
        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    static SOURCE: &[PortDescriptor] = &[PortDescriptor::output("out", SCALAR)];
    static TEXT_SOURCE: &[PortDescriptor] = &[PortDescriptor::output("out", TEXT)];
    static PASS: &[PortDescriptor] = &[
        PortDescriptor::input("in", SCALAR),
        PortDescriptor::output("out", SCALAR),
    ];
    static GATHER: &[PortDescriptor] = &[PortDescriptor::multi_input("in", SCALAR)];

    fn add(graph: &mut Graph, ports: &'static [PortDescriptor]) -> ProcessorId {
        let id = graph.next_id().unwrap();
        let slot = ProcessorSlot::new(id, format!("p{}", id.0), Box::new(Stub(ports))).unwrap();
        graph.insert(slot)
    }

    fn out(id: ProcessorId) -> OutportId {
        OutportId::new(id, 0)
    }

    fn inp(id: ProcessorId) -> InportId {
        InportId::new(id, 0)
    }

    #[test]
    fn test_connect_rejects_type_mismatch() {
        let mut graph = Graph::new();
        let text = add(&mut graph, TEXT_SOURCE);
        let pass = add(&mut graph, PASS);
        let err = graph.connect(out(text), inp(pass)).unwrap_err();
        assert!(matches!(err, NetworkError::IncompatibleConnection { .. }));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_single_inport_takes_one_connection() {
        let mut graph = Graph::new();
        let a = add(&mut graph, SOURCE);
        let b = add(&mut graph, SOURCE);
        let pass = add(&mut graph, PASS);
        graph.connect(out(a), inp(pass)).unwrap();
        let err = graph.connect(out(b), inp(pass)).unwrap_err();
        assert!(err.to_string().contains("already connected"));
    }

    #[test]
    fn test_unknown_ports_are_reported() {
        let mut graph = Graph::new();
        let a = add(&mut graph, SOURCE);
        let missing = InportId::new(ProcessorId(77), 0);
        assert!(matches!(
            graph.connect(out(a), missing),
            Err(NetworkError::UnknownPort(_))
        ));
    }

    #[test]
    fn test_invalidation_reaches_downstream_once() {
        let mut graph = Graph::new();
        let a = add(&mut graph, SOURCE);
        let b = add(&mut graph, PASS);
        let c = add(&mut graph, GATHER);
        graph.connect(out(a), inp(b)).unwrap();
        graph.connect(out(b), inp(c)).unwrap();
        for id in [a, b, c] {
            graph.slot_mut(id).unwrap().set_valid();
        }

        graph.invalidate(a, InvalidationLevel::InvalidResources);

        assert_eq!(
            graph.slot(a).unwrap().invalidation_level(),
            InvalidationLevel::InvalidResources
        );
        assert_eq!(
            graph.slot(c).unwrap().invalidation_level(),
            InvalidationLevel::InvalidOutput
        );
        assert!(graph.inport(inp(c)).unwrap().is_changed());
    }

    #[test]
    fn test_invalidation_terminates_on_cycles() {
        let mut graph = Graph::new();
        let a = add(&mut graph, PASS);
        let b = add(&mut graph, PASS);
        graph.connect(out(a), inp(b)).unwrap();
        graph.connect(out(b), inp(a)).unwrap();
        graph.invalidate(a, InvalidationLevel::InvalidOutput);
        assert!(!graph.slot(b).unwrap().is_valid());
    }

    #[test]
    fn test_disconnect_and_validate() {
        let mut graph = Graph::new();
        let a = add(&mut graph, SOURCE);
        let c = add(&mut graph, GATHER);
        let gen = graph.generation();
        graph.connect(out(a), inp(c)).unwrap();
        assert!(graph.generation() > gen);
        assert!(graph.validate().is_ok());
        assert_eq!(graph.direct_successors(a), vec![c]);
        assert_eq!(graph.direct_predecessors(c), vec![a]);

        assert!(graph.disconnect(out(a), inp(c)).is_some());
        assert!(graph.disconnect(out(a), inp(c)).is_none());
        assert!(!graph.inport(inp(c)).unwrap().is_connected());
    }

    #[test]
    fn test_validate_detects_dangling_connection() {
        let mut graph = Graph::new();
        let a = add(&mut graph, SOURCE);
        let c = add(&mut graph, GATHER);
        graph.connect(out(a), inp(c)).unwrap();
        graph.take(a);
        assert!(matches!(
            graph.validate(),
            Err(NetworkError::DanglingReference(_))
        ));
    }
}
