//! Processor abstraction.
//!
//! - **`Processor` trait**: what a node implementation provides. Ports are
//!   declared statically, work happens in `process()`.
//! - **`ProcessorSlot`**: the network's record for one processor. It owns the
//!   processor object together with the port instances built from its
//!   descriptors and the property handles it exposes, and tracks lifecycle,
//!   invalidation and pending async work.
//!
//! Capabilities are queried through the trait (`capabilities()`, `is_sink()`),
//! never by downcasting the processor object.

use super::context::{InportStates, OutputBuffer, ProcessContext};
use super::error::{NetworkError, NetworkResult, ProcessorError};
use super::id::{InportId, OutportId, ProcessorId};
use super::invalidation::InvalidationLevel;
use super::multi_inport::AnyInport;
use super::pool::{LivenessToken, StopToken};
use super::port::{Outport, PortDescriptor};
use super::property::{PropertyBinding, PropertyId, PropertyRef};
use crossbeam_channel::Sender;
use std::collections::HashSet;
use std::fmt;

/// Trait implemented by every node in a network.
pub trait Processor: Send {
    /// Human-readable name. Also the base of the processor's network identifier.
    fn display_name(&self) -> &str;

    /// Port descriptors for this processor. Must not change after insertion.
    fn ports(&self) -> &[PortDescriptor];

    /// User-editable properties. Read once, at insertion; names must be unique.
    fn properties(&self) -> Vec<PropertyRef> {
        Vec::new()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Sinks have no outports and are the natural consumers of a pass.
    fn is_sink(&self) -> bool {
        !self.ports().iter().any(PortDescriptor::is_output)
    }

    /// Called once when the processor joins a network.
    fn initialize(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Called once before the processor leaves a network.
    fn deinitialize(&mut self) {}

    /// Default: every mandatory inport is connected to valid data.
    fn is_ready(&self, inports: &InportStates<'_>) -> bool {
        inports.all_ready()
    }

    /// Consume inputs and produce outputs.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError>;
}

/// Optional behaviour a processor opts into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// May hand work to the worker pool via `ProcessContext::dispatch`.
    pub asynchronous: bool,
}

impl Capabilities {
    pub const SYNC: Capabilities = Capabilities {
        asynchronous: false,
    };
    pub const ASYNC: Capabilities = Capabilities { asynchronous: true };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconstructed,
    Initialized,
    Deinitialized,
}

/// Bookkeeping for a job that has been dispatched but not applied yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingJob {
    pub epoch: u64,
    pub stop: StopToken,
    /// Invalidation count at dispatch time.
    pub invalidation_mark: u64,
}

/// The network's record for one processor.
pub struct ProcessorSlot {
    pub(crate) id: ProcessorId,
    pub(crate) identifier: String,
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) inports: Vec<AnyInport>,
    pub(crate) outports: Vec<Outport>,
    properties: Vec<PropertyRef>,
    state: LifecycleState,
    level: InvalidationLevel,
    invalidations: u64,
    failed_at: Option<u64>,
    pending: Option<PendingJob>,
    next_epoch: u64,
    liveness: LivenessToken,
    process_count: u64,
}

impl ProcessorSlot {
    /// Builds port instances from the processor's descriptors and collects
    /// its properties.
    pub(crate) fn new(
        id: ProcessorId,
        identifier: String,
        processor: Box<dyn Processor>,
    ) -> NetworkResult<Self> {
        let inputs = processor.ports().iter().filter(|p| p.is_input()).count();
        let outputs = processor.ports().len() - inputs;
        let mut names = HashSet::new();
        let mut inports = Vec::with_capacity(inputs);
        let mut outports = Vec::with_capacity(outputs);

        for descriptor in processor.ports() {
            if !names.insert(descriptor.name) {
                return Err(NetworkError::PortLayout {
                    identifier,
                    message: format!("duplicate port name '{}'", descriptor.name),
                });
            }
            if descriptor.is_input() {
                inports.push(AnyInport::from_descriptor(
                    InportId::new(id, inports.len()),
                    *descriptor,
                ));
            } else {
                outports.push(Outport::new(OutportId::new(id, outports.len()), *descriptor));
            }
        }

        let properties = processor.properties();
        let mut property_names = HashSet::new();
        if let Some(duplicate) = properties
            .iter()
            .find(|property| !property_names.insert(property.name().to_string()))
        {
            return Err(NetworkError::PortLayout {
                message: format!("duplicate property name '{}'", duplicate.name()),
                identifier,
            });
        }

        Ok(Self {
            id,
            identifier,
            processor,
            inports,
            outports,
            properties,
            state: LifecycleState::Unconstructed,
            level: InvalidationLevel::Valid,
            invalidations: 0,
            failed_at: None,
            pending: None,
            next_epoch: 0,
            liveness: LivenessToken::new(),
            process_count: 0,
        })
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Unique within the owning network.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_name(&self) -> &str {
        self.processor.display_name()
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn capabilities(&self) -> Capabilities {
        self.processor.capabilities()
    }

    pub fn is_sink(&self) -> bool {
        self.processor.is_sink()
    }

    pub fn is_source(&self) -> bool {
        self.inports.is_empty()
    }

    pub fn inports(&self) -> &[AnyInport] {
        &self.inports
    }

    pub fn outports(&self) -> &[Outport] {
        &self.outports
    }

    pub fn inport(&self, index: usize) -> Option<&AnyInport> {
        self.inports.get(index)
    }

    pub fn outport(&self, index: usize) -> Option<&Outport> {
        self.outports.get(index)
    }

    pub fn inport_by_name(&self, name: &str) -> Option<&AnyInport> {
        self.inports.iter().find(|p| p.name() == name)
    }

    pub fn outport_by_name(&self, name: &str) -> Option<&Outport> {
        self.outports.iter().find(|p| p.name() == name)
    }

    pub fn properties(&self) -> &[PropertyRef] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> Option<&PropertyRef> {
        self.properties.get(index)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name() == name)
    }

    /// Max over the internal level and every owned port.
    pub fn invalidation_level(&self) -> InvalidationLevel {
        let inports = self
            .inports
            .iter()
            .map(AnyInport::invalidation_level)
            .fold(self.level, InvalidationLevel::combine);
        self.outports
            .iter()
            .map(Outport::invalidation_level)
            .fold(inports, InvalidationLevel::combine)
    }

    pub fn is_valid(&self) -> bool {
        self.invalidation_level().is_valid()
    }

    pub fn is_awaiting_completion(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of `process()` calls so far, failed ones included.
    pub fn process_count(&self) -> u64 {
        self.process_count
    }

    // ── Lifecycle ──

    pub(crate) fn initialize(&mut self) -> Result<(), ProcessorError> {
        self.processor.initialize()?;
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Stops pending work, revokes the liveness token and unbinds properties.
    pub(crate) fn deinitialize(&mut self) {
        if self.state == LifecycleState::Initialized {
            self.processor.deinitialize();
        }
        self.state = LifecycleState::Deinitialized;
        self.cancel_job();
        self.liveness.revoke();
        for property in &self.properties {
            property.unbind();
        }
    }

    /// Routes property changes to `changes`, tagged with this slot's id.
    pub(crate) fn bind_properties(&self, changes: &Sender<PropertyId>) {
        for (index, property) in self.properties.iter().enumerate() {
            property.bind(PropertyBinding::new(
                PropertyId::new(self.id, index),
                changes.clone(),
            ));
        }
    }

    pub(crate) fn set_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    // ── Invalidation ──

    pub(crate) fn raise(&mut self, level: InvalidationLevel) {
        self.level.raise(level);
        self.invalidations += 1;
    }

    pub(crate) fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Every owned port consumed, every output current.
    pub(crate) fn set_valid(&mut self) {
        self.level = InvalidationLevel::Valid;
        self.failed_at = None;
        for port in &mut self.inports {
            port.reset();
        }
        for port in &mut self.outports {
            port.reset();
        }
    }

    pub(crate) fn record_process(&mut self) {
        self.process_count += 1;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.mark_failed_at(self.invalidations);
    }

    pub(crate) fn mark_failed_at(&mut self, invalidation_mark: u64) {
        self.failed_at = Some(invalidation_mark);
    }

    /// Failed on its last attempt and nothing has invalidated it since.
    pub(crate) fn is_parked_after_failure(&self) -> bool {
        self.failed_at == Some(self.invalidations)
    }

    /// A job is in flight and the inputs it was started from are still current.
    pub(crate) fn is_waiting_on_job(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|job| job.invalidation_mark == self.invalidations)
    }

    // ── Outputs ──

    /// All-or-nothing: an out-of-range index rejects the whole buffer.
    pub(crate) fn commit_outputs(&mut self, outputs: OutputBuffer) -> Result<(), ProcessorError> {
        if let Some(bad) = outputs.indices().find(|&i| i >= self.outports.len()) {
            return Err(ProcessorError::OutputOutOfRange(bad));
        }
        for (index, data) in outputs.into_values() {
            self.outports[index].set_data(data);
        }
        Ok(())
    }

    // ── Async jobs ──

    /// Registers a new job, stopping any older one.
    pub(crate) fn begin_job(&mut self) -> (u64, StopToken) {
        self.cancel_job();
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let stop = StopToken::new(self.liveness.clone());
        self.pending = Some(PendingJob {
            epoch,
            stop: stop.clone(),
            invalidation_mark: self.invalidations,
        });
        (epoch, stop)
    }

    /// Takes the pending job if `epoch` is the current one.
    pub(crate) fn finish_job(&mut self, epoch: u64) -> Option<PendingJob> {
        match &self.pending {
            Some(job) if job.epoch == epoch => self.pending.take(),
            _ => None,
        }
    }

    pub(crate) fn cancel_job(&mut self) {
        if let Some(job) = self.pending.take() {
            job.stop.stop();
        }
    }
}

impl fmt::Debug for ProcessorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorSlot")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("state", &self.state)
            .field("level", &self.invalidation_level())
            .field("inports", &self.inports.len())
            .field("outports", &self.outports.len())
            .field("properties", &self.properties.len())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::port::DataType;
    use crate::network::property::{Property, PropertyQueue};

    const SCALAR: DataType = DataType::new("f64");

    struct Layout(&'static [PortDescriptor]);

    impl Processor for Layout {
        fn display_name(&self) -> &str {
            "Layout"
        }

        fn ports(&self) -> &[PortDescriptor] {
            self.0
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    static TRANSFORM: &[PortDescriptor] = &[
        PortDescriptor::input("in", SCALAR),
        PortDescriptor::multi_input("extra", SCALAR),
        PortDescriptor::output("out", SCALAR),
    ];

    static DUPLICATE: &[PortDescriptor] = &[
        PortDescriptor::input("x", SCALAR),
        PortDescriptor::output("x", SCALAR),
    ];

    struct Knobs(Vec<Property<f64>>);

    impl Processor for Knobs {
        fn display_name(&self) -> &str {
            "Knobs"
        }

        fn ports(&self) -> &[PortDescriptor] {
            TRANSFORM
        }

        fn properties(&self) -> Vec<PropertyRef> {
            self.0.iter().map(Property::handle).collect()
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn slot(ports: &'static [PortDescriptor]) -> NetworkResult<ProcessorSlot> {
        ProcessorSlot::new(ProcessorId(2), "Layout".into(), Box::new(Layout(ports)))
    }

    #[test]
    fn test_ports_indexed_per_direction() {
        let slot = slot(TRANSFORM).unwrap();
        assert_eq!(slot.inports().len(), 2);
        assert_eq!(slot.outports().len(), 1);
        assert_eq!(slot.inports()[1].id(), InportId::new(ProcessorId(2), 1));
        assert!(slot.inports()[1].is_multi());
        assert_eq!(slot.outports()[0].id(), OutportId::new(ProcessorId(2), 0));
        assert!(!slot.is_sink());
        assert!(!slot.is_source());
        assert_eq!(slot.state(), LifecycleState::Unconstructed);
    }

    #[test]
    fn test_duplicate_port_names_rejected() {
        assert!(matches!(slot(DUPLICATE), Err(NetworkError::PortLayout { .. })));
    }

    #[test]
    fn test_fresh_outputs_make_slot_invalid() {
        let mut slot = slot(TRANSFORM).unwrap();
        assert_eq!(slot.invalidation_level(), InvalidationLevel::InvalidOutput);
        slot.set_valid();
        assert!(slot.is_valid());
        slot.raise(InvalidationLevel::InvalidResources);
        assert_eq!(
            slot.invalidation_level(),
            InvalidationLevel::InvalidResources
        );
    }

    #[test]
    fn test_failure_parks_until_next_invalidation() {
        let mut slot = slot(TRANSFORM).unwrap();
        slot.raise(InvalidationLevel::InvalidOutput);
        slot.mark_failed();
        assert!(slot.is_parked_after_failure());
        slot.raise(InvalidationLevel::InvalidOutput);
        assert!(!slot.is_parked_after_failure());
    }

    #[test]
    fn test_new_job_supersedes_old() {
        let mut slot = slot(TRANSFORM).unwrap();
        let (first, first_stop) = slot.begin_job();
        let (second, second_stop) = slot.begin_job();
        assert!(first_stop.is_stopped());
        assert!(!second_stop.is_stopped());
        assert!(slot.finish_job(first).is_none());
        assert!(slot.is_waiting_on_job());
        assert!(slot.finish_job(second).is_some());
        assert!(!slot.is_awaiting_completion());
    }

    #[test]
    fn test_deinitialize_revokes_liveness() {
        let mut slot = slot(TRANSFORM).unwrap();
        slot.initialize().unwrap();
        let (_, stop) = slot.begin_job();
        slot.deinitialize();
        assert_eq!(slot.state(), LifecycleState::Deinitialized);
        assert!(stop.is_stopped());
        assert!(!stop.liveness().is_alive());
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let mut slot = slot(TRANSFORM).unwrap();
        let outputs = OutputBuffer::new().with(0, 1.0_f64).with(3, 2.0_f64);
        assert!(slot.commit_outputs(outputs).is_err());
        assert!(!slot.outports()[0].has_data());

        slot.commit_outputs(OutputBuffer::new().with(0, 1.0_f64))
            .unwrap();
        assert_eq!(slot.outports()[0].get::<f64>(), Some(&1.0));
    }

    #[test]
    fn test_properties_bind_and_unbind_with_lifecycle() {
        let gain = Property::new("gain", 1.0);
        let bias = Property::new("bias", 0.0);
        let mut slot = ProcessorSlot::new(
            ProcessorId(5),
            "Knobs".into(),
            Box::new(Knobs(vec![gain.clone(), bias.clone()])),
        )
        .unwrap();
        assert_eq!(slot.property_index("bias"), Some(1));
        assert!(slot.property(2).is_none());

        let queue = PropertyQueue::new();
        slot.bind_properties(&queue.sender());
        assert_eq!(bias.binding(), Some(PropertyId::new(ProcessorId(5), 1)));
        bias.set(0.5);
        assert_eq!(queue.drain(), vec![PropertyId::new(ProcessorId(5), 1)]);

        slot.deinitialize();
        assert!(gain.binding().is_none());
        gain.set(3.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_property_names_rejected() {
        let knobs = Knobs(vec![Property::new("gain", 1.0), Property::new("gain", 2.0)]);
        let result = ProcessorSlot::new(ProcessorId(0), "Knobs".into(), Box::new(knobs));
        assert!(matches!(
            result,
            Err(NetworkError::PortLayout { message, .. }) if message.contains("gain")
        ));
    }
}
