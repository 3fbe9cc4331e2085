//! What a processor sees while it runs.
//!
//! The evaluator snapshots every connected outport value (an `Arc` clone, no
//! copies) into [`InputView`]s before calling `process()`. Outputs are
//! buffered in an [`OutputBuffer`] and only committed if `process()` succeeds,
//! so a failing processor never publishes half of its results.

use super::error::ProcessorError;
use super::id::{OutportId, ProcessorId};
use super::invalidation::InvalidationLevel;
use super::pool::{Job, JobResult, StopToken};
use super::port::{Outport, PortData};
use super::processor::Capabilities;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Values keyed by outport index.
#[derive(Default, Clone)]
pub struct OutputBuffer {
    values: Vec<(usize, PortData)>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, index: usize, value: T) {
        self.set_shared(index, Arc::new(value));
    }

    /// Stores an already shared value; later writes to the same index win.
    pub fn set_shared(&mut self, index: usize, data: PortData) {
        match self.values.iter_mut().find(|(i, _)| *i == index) {
            Some(entry) => entry.1 = data,
            None => self.values.push((index, data)),
        }
    }

    pub fn with<T: Any + Send + Sync>(mut self, index: usize, value: T) -> Self {
        self.set(index, value);
        self
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values
            .iter()
            .find(|(i, _)| *i == index)
            .and_then(|(_, data)| data.downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.values.iter().map(|(i, _)| *i)
    }

    pub(crate) fn into_values(self) -> Vec<(usize, PortData)> {
        self.values
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("indices", &self.indices().collect::<Vec<_>>())
            .finish()
    }
}

/// One connection feeding an inport.
#[derive(Clone)]
pub struct InputSource {
    pub outport: OutportId,
    pub data: Option<PortData>,
    pub version: u64,
    /// The consumer has not seen this value yet.
    pub changed: bool,
}

/// Snapshot of one inport taken right before `process()`.
#[derive(Clone)]
pub struct InputView {
    pub name: &'static str,
    pub sources: Vec<InputSource>,
}

/// Readiness facts about one inport, handed to `Processor::is_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InportState {
    pub name: &'static str,
    pub optional: bool,
    pub connections: usize,
    /// Every connected outport holds valid data.
    pub ready: bool,
    pub changed: bool,
}

impl InportState {
    /// Optional ports without connections do not hold the processor back.
    pub fn is_satisfied(&self) -> bool {
        if self.connections == 0 {
            self.optional
        } else {
            self.ready
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InportStates<'a> {
    states: &'a [InportState],
}

impl<'a> InportStates<'a> {
    pub fn new(states: &'a [InportState]) -> Self {
        Self { states }
    }

    pub fn all_ready(&self) -> bool {
        self.states.iter().all(InportState::is_satisfied)
    }

    pub fn any_changed(&self) -> bool {
        self.states.iter().any(|s| s.changed)
    }

    pub fn get(&self, index: usize) -> Option<&InportState> {
        self.states.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&InportState> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InportState> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Passed to `Processor::process`.
pub struct ProcessContext<'a> {
    processor: ProcessorId,
    identifier: &'a str,
    level: InvalidationLevel,
    inputs: &'a [InputView],
    outports: &'a [Outport],
    capabilities: Capabilities,
    outputs: OutputBuffer,
    job: Option<Job>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        processor: ProcessorId,
        identifier: &'a str,
        level: InvalidationLevel,
        inputs: &'a [InputView],
        outports: &'a [Outport],
        capabilities: Capabilities,
    ) -> Self {
        Self {
            processor,
            identifier,
            level,
            inputs,
            outports,
            capabilities,
            outputs: OutputBuffer::new(),
            job: None,
        }
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.processor
    }

    pub fn identifier(&self) -> &str {
        self.identifier
    }

    /// Why the processor is running. `InvalidResources` means internal state
    /// must be rebuilt, not just outputs.
    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.level
    }

    // ── Inputs ──

    fn view(&self, index: usize) -> Result<&InputView, ProcessorError> {
        self.inputs
            .get(index)
            .ok_or_else(|| ProcessorError::NoSuchPort(format!("inport #{index}")))
    }

    pub fn inport_index(&self, name: &str) -> Result<usize, ProcessorError> {
        self.inputs
            .iter()
            .position(|view| view.name == name)
            .ok_or_else(|| ProcessorError::NoSuchPort(name.to_string()))
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_connections(&self, index: usize) -> usize {
        self.inputs.get(index).map_or(0, |view| view.sources.len())
    }

    pub fn is_input_changed(&self, index: usize) -> bool {
        self.inputs
            .get(index)
            .is_some_and(|view| view.sources.iter().any(|s| s.changed))
    }

    fn downcast<T: Any>(index: usize, data: &PortData) -> Result<&T, ProcessorError> {
        data.downcast_ref::<T>()
            .ok_or(ProcessorError::TypeMismatch {
                port: index,
                expected: type_name::<T>(),
            })
    }

    /// Value of the first connection on inport `index`.
    pub fn input<T: Any>(&self, index: usize) -> Result<&T, ProcessorError> {
        self.input_opt(index)?
            .ok_or(ProcessorError::MissingInput(index))
    }

    /// Like [`input`](Self::input) but `None` for an unconnected optional port.
    pub fn input_opt<T: Any>(&self, index: usize) -> Result<Option<&T>, ProcessorError> {
        let view = self.view(index)?;
        match view.sources.first() {
            None => Ok(None),
            Some(source) => {
                let data = source
                    .data
                    .as_ref()
                    .ok_or(ProcessorError::MissingInput(index))?;
                Self::downcast(index, data).map(Some)
            }
        }
    }

    /// Shared handle to the first value on inport `index`.
    pub fn input_shared(&self, index: usize) -> Result<PortData, ProcessorError> {
        self.view(index)?
            .sources
            .first()
            .and_then(|s| s.data.clone())
            .ok_or(ProcessorError::MissingInput(index))
    }

    /// Every value on inport `index`, in connection order.
    pub fn inputs<T: Any>(&self, index: usize) -> Result<Vec<&T>, ProcessorError> {
        Ok(self
            .changed_inputs::<T>(index)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// `(changed, value)` for every connection on inport `index`.
    pub fn changed_inputs<T: Any>(&self, index: usize) -> Result<Vec<(bool, &T)>, ProcessorError> {
        self.view(index)?
            .sources
            .iter()
            .map(|source| -> Result<(bool, &T), ProcessorError> {
                let data = source
                    .data
                    .as_ref()
                    .ok_or(ProcessorError::MissingInput(index))?;
                Ok((source.changed, Self::downcast(index, data)?))
            })
            .collect()
    }

    pub fn input_sources(&self, index: usize) -> &[InputSource] {
        self.inputs
            .get(index)
            .map_or(&[][..], |view| view.sources.as_slice())
    }

    // ── Outputs ──

    pub fn outport_index(&self, name: &str) -> Result<usize, ProcessorError> {
        self.outports
            .iter()
            .position(|port| port.name() == name)
            .ok_or_else(|| ProcessorError::NoSuchPort(name.to_string()))
    }

    pub fn set_output<T: Any + Send + Sync>(
        &mut self,
        index: usize,
        value: T,
    ) -> Result<(), ProcessorError> {
        self.set_output_shared(index, Arc::new(value))
    }

    pub fn set_output_shared(&mut self, index: usize, data: PortData) -> Result<(), ProcessorError> {
        if index >= self.outports.len() {
            return Err(ProcessorError::OutputOutOfRange(index));
        }
        self.outputs.set_shared(index, data);
        Ok(())
    }

    /// Passes the first value of an inport through without copying it.
    pub fn forward(&mut self, input: usize, output: usize) -> Result<(), ProcessorError> {
        let data = self.input_shared(input)?;
        self.set_output_shared(output, data)
    }

    /// The value currently published on outport `index`.
    pub fn previous_output<T: Any>(&self, index: usize) -> Option<&T> {
        self.outports.get(index)?.get::<T>()
    }

    // ── Background work ──

    /// Hands `job` to the worker pool. Outputs arrive when the job's
    /// completion is applied on the network thread; until then the processor
    /// stays invalid and downstream consumers wait.
    pub fn dispatch<F>(&mut self, job: F) -> Result<(), ProcessorError>
    where
        F: FnOnce(&StopToken) -> JobResult + Send + 'static,
    {
        if !self.capabilities.asynchronous {
            return Err(ProcessorError::AsyncUnsupported);
        }
        self.job = Some(Box::new(job));
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (OutputBuffer, Option<Job>) {
        (self.outputs, self.job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::port::{DataType, PortDescriptor};

    const SCALAR: DataType = DataType::new("f64");

    fn view(name: &'static str, values: &[(f64, bool)]) -> InputView {
        InputView {
            name,
            sources: values
                .iter()
                .enumerate()
                .map(|(i, (value, changed))| InputSource {
                    outport: OutportId::new(ProcessorId(i as u32), 0),
                    data: Some(Arc::new(*value)),
                    version: 1,
                    changed: *changed,
                })
                .collect(),
        }
    }

    fn outports() -> Vec<Outport> {
        vec![Outport::new(
            OutportId::new(ProcessorId(9), 0),
            PortDescriptor::output("out", SCALAR),
        )]
    }

    #[test]
    fn test_typed_inputs() {
        let inputs = vec![view("a", &[(1.5, true)]), view("many", &[(1.0, false), (2.0, true)])];
        let outs = outports();
        let ctx = ProcessContext::new(
            ProcessorId(9),
            "Test",
            InvalidationLevel::InvalidOutput,
            &inputs,
            &outs,
            Capabilities::default(),
        );
        assert_eq!(ctx.input::<f64>(0).unwrap(), &1.5);
        assert!(matches!(
            ctx.input::<i32>(0),
            Err(ProcessorError::TypeMismatch { port: 0, .. })
        ));
        assert_eq!(ctx.inputs::<f64>(1).unwrap(), vec![&1.0, &2.0]);
        assert_eq!(
            ctx.changed_inputs::<f64>(1).unwrap(),
            vec![(false, &1.0), (true, &2.0)]
        );
        assert!(ctx.is_input_changed(1));
        assert_eq!(ctx.inport_index("many").unwrap(), 1);
        assert!(ctx.input::<f64>(5).is_err());
    }

    #[test]
    fn test_unconnected_optional_input() {
        let inputs = vec![InputView {
            name: "bias",
            sources: Vec::new(),
        }];
        let outs = outports();
        let ctx = ProcessContext::new(
            ProcessorId(0),
            "Test",
            InvalidationLevel::InvalidOutput,
            &inputs,
            &outs,
            Capabilities::default(),
        );
        assert!(ctx.input_opt::<f64>(0).unwrap().is_none());
        assert!(matches!(ctx.input::<f64>(0), Err(ProcessorError::MissingInput(0))));
    }

    #[test]
    fn test_outputs_are_buffered_and_bounded() {
        let outs = outports();
        let mut ctx = ProcessContext::new(
            ProcessorId(0),
            "Test",
            InvalidationLevel::InvalidOutput,
            &[],
            &outs,
            Capabilities::default(),
        );
        ctx.set_output(0, 1.0_f64).unwrap();
        ctx.set_output(0, 2.0_f64).unwrap();
        assert!(matches!(
            ctx.set_output(1, 0.0_f64),
            Err(ProcessorError::OutputOutOfRange(1))
        ));
        let (outputs, job) = ctx.into_parts();
        assert!(job.is_none());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get::<f64>(0), Some(&2.0));
    }

    #[test]
    fn test_dispatch_requires_capability() {
        let outs = outports();
        let mut ctx = ProcessContext::new(
            ProcessorId(0),
            "Test",
            InvalidationLevel::InvalidOutput,
            &[],
            &outs,
            Capabilities::default(),
        );
        let result = ctx.dispatch(|_| Ok(OutputBuffer::new()));
        assert!(matches!(result, Err(ProcessorError::AsyncUnsupported)));

        let mut ctx = ProcessContext::new(
            ProcessorId(0),
            "Test",
            InvalidationLevel::InvalidOutput,
            &[],
            &outs,
            Capabilities::ASYNC,
        );
        ctx.dispatch(|_| Ok(OutputBuffer::new())).unwrap();
        assert!(ctx.into_parts().1.is_some());
    }
}
