//! Sum: adds up every connection on a multi inport.

use super::SCALAR;
use crate::network::{PortDescriptor, ProcessContext, Processor, ProcessorError};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::multi_input("terms", SCALAR).optional(),
    PortDescriptor::output("sum", SCALAR),
];

/// Aggregator over any number of terms. With no terms connected it
/// publishes `0.0`.
#[derive(Debug, Default)]
pub struct Sum {
    /// How many terms carried new data on the last run.
    last_changed: usize,
}

impl Sum {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Sum {
    fn display_name(&self) -> &str {
        "Sum"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let terms = ctx.changed_inputs::<f64>(0)?;
        self.last_changed = terms.iter().filter(|(changed, _)| *changed).count();
        let total: f64 = terms.iter().map(|(_, value)| **value).sum();
        tracing::trace!(
            "{}: {} terms ({} changed) = {}",
            ctx.identifier(),
            terms.len(),
            self.last_changed,
            total
        );
        ctx.set_output(0, total)
    }
}
