//! AsyncScale: `Scale` computed on the worker pool.

use super::SCALAR;
use crate::network::{
    Capabilities, OutputBuffer, PortDescriptor, ProcessContext, Processor, ProcessorError,
    Property, PropertyRef,
};
use std::time::{Duration, Instant};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", SCALAR),
    PortDescriptor::output("out", SCALAR),
];

/// Stop-token polling interval while simulating work.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Multiplies its input by a factor after an artificial delay, off the
/// network thread. The output appears when the completion is applied.
pub struct AsyncScale {
    factor: Property<f64>,
    delay: Duration,
}

impl AsyncScale {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: Property::new("factor", factor),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn factor(&self) -> Property<f64> {
        self.factor.clone()
    }
}

impl Processor for AsyncScale {
    fn display_name(&self) -> &str {
        "Async Scale"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn properties(&self) -> Vec<PropertyRef> {
        vec![self.factor.handle()]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ASYNC
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = *ctx.input::<f64>(0)?;
        let factor = self.factor.get();
        let delay = self.delay;

        ctx.dispatch(move |stop| {
            let started = Instant::now();
            while started.elapsed() < delay {
                if stop.is_stopped() {
                    return Err(ProcessorError::failed("cancelled"));
                }
                std::thread::sleep(POLL_INTERVAL.min(delay));
            }
            Ok(OutputBuffer::new().with(0, value * factor))
        })
    }
}
