//! Instrumented processors for integration tests.
//!
//! Every probe appends its id to a shared [`CallLog`] when `process()` runs,
//! so tests can check both how often and in which order processors ran.

use procflow::network::{
    Capabilities, DataType, OutputBuffer, PortDescriptor, ProcessContext, Processor,
    ProcessorError, ProcessorId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SCALAR: DataType = DataType::new("f64");
pub const TEXT: DataType = DataType::new("text");

static SOURCE: &[PortDescriptor] = &[PortDescriptor::output("out", SCALAR)];
static PASS: &[PortDescriptor] = &[
    PortDescriptor::input("in", SCALAR),
    PortDescriptor::output("out", SCALAR),
];
static GATHER: &[PortDescriptor] = &[
    PortDescriptor::multi_input("in", SCALAR),
    PortDescriptor::output("out", SCALAR),
];
static SINK: &[PortDescriptor] = &[PortDescriptor::input("in", SCALAR)];
static TEXT_SINK: &[PortDescriptor] = &[PortDescriptor::input("in", TEXT)];

/// Order in which processors ran.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<ProcessorId>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, id: ProcessorId) {
        self.0.lock().unwrap().push(id);
    }

    pub fn calls(&self) -> Vec<ProcessorId> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, id: ProcessorId) -> usize {
        self.calls().iter().filter(|&&c| c == id).count()
    }

    pub fn position(&self, id: ProcessorId) -> Option<usize> {
        self.calls().iter().position(|&c| c == id)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Emits how many times it ran.
    Source,
    /// Emits its input plus one.
    Pass,
    /// Emits the sum of all inputs on a multi inport.
    Gather,
    /// Consumes a scalar.
    Sink,
    /// Consumes text; used for type mismatch tests.
    TextSink,
}

/// Switches shared between a probe and the test body.
#[derive(Clone, Default)]
pub struct ProbeControl {
    pub calls: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub panic: Arc<AtomicBool>,
    /// Makes background jobs fail instead of `process()` itself.
    pub job_fail: Arc<AtomicBool>,
    pub last_input: Arc<Mutex<Option<f64>>>,
}

impl ProbeControl {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }

    pub fn set_job_failing(&self, fail: bool) {
        self.job_fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_input(&self) -> Option<f64> {
        *self.last_input.lock().unwrap()
    }
}

pub struct Probe {
    shape: Shape,
    log: CallLog,
    control: ProbeControl,
    /// When set, the output is produced on the worker pool after this delay.
    async_delay: Option<Duration>,
}

impl Probe {
    pub fn new(shape: Shape, log: &CallLog) -> Self {
        Self {
            shape,
            log: log.clone(),
            control: ProbeControl::default(),
            async_delay: None,
        }
    }

    pub fn source(log: &CallLog) -> Self {
        Self::new(Shape::Source, log)
    }

    pub fn pass(log: &CallLog) -> Self {
        Self::new(Shape::Pass, log)
    }

    pub fn gather(log: &CallLog) -> Self {
        Self::new(Shape::Gather, log)
    }

    pub fn sink(log: &CallLog) -> Self {
        Self::new(Shape::Sink, log)
    }

    /// Pass-through that computes on the worker pool.
    pub fn background(log: &CallLog, delay: Duration) -> Self {
        Self {
            async_delay: Some(delay),
            ..Self::new(Shape::Pass, log)
        }
    }

    pub fn control(&self) -> ProbeControl {
        self.control.clone()
    }

    fn compute(&self, ctx: &ProcessContext<'_>) -> Result<Option<f64>, ProcessorError> {
        let output = match self.shape {
            Shape::Source => Some(self.control.calls() as f64),
            Shape::Pass => {
                let value = *ctx.input::<f64>(0)?;
                *self.control.last_input.lock().unwrap() = Some(value);
                Some(value + 1.0)
            }
            Shape::Gather => Some(ctx.inputs::<f64>(0)?.into_iter().sum()),
            Shape::Sink => {
                let value = *ctx.input::<f64>(0)?;
                *self.control.last_input.lock().unwrap() = Some(value);
                None
            }
            Shape::TextSink => None,
        };
        Ok(output)
    }
}

impl Processor for Probe {
    fn display_name(&self) -> &str {
        match self.shape {
            Shape::Source => "Source",
            Shape::Pass => "Pass",
            Shape::Gather => "Gather",
            Shape::Sink | Shape::TextSink => "Sink",
        }
    }

    fn ports(&self) -> &[PortDescriptor] {
        match self.shape {
            Shape::Source => SOURCE,
            Shape::Pass => PASS,
            Shape::Gather => GATHER,
            Shape::Sink => SINK,
            Shape::TextSink => TEXT_SINK,
        }
    }

    fn capabilities(&self) -> Capabilities {
        if self.async_delay.is_some() {
            Capabilities::ASYNC
        } else {
            Capabilities::SYNC
        }
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        self.control.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(ctx.processor_id());

        if self.control.panic.load(Ordering::SeqCst) {
            panic!("probe panicked");
        }
        if self.control.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::failed("probe failure"));
        }

        let Some(output) = self.compute(ctx)? else {
            return Ok(());
        };

        match self.async_delay {
            None => ctx.set_output(0, output),
            Some(delay) => {
                let fail = Arc::clone(&self.control.job_fail);
                ctx.dispatch(move |stop| {
                    std::thread::sleep(delay);
                    if stop.is_stopped() {
                        return Err(ProcessorError::failed("stopped"));
                    }
                    if fail.load(Ordering::SeqCst) {
                        return Err(ProcessorError::failed("background failure"));
                    }
                    Ok(OutputBuffer::new().with(0, output))
                })
            }
        }
    }
}
