//! ValueSource: publishes a user-set scalar.

use super::SCALAR;
use crate::network::{
    PortDescriptor, ProcessContext, Processor, ProcessorError, Property, PropertyRef,
};

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("value", SCALAR)];

/// Source with no inports. Re-publishes its `value` property whenever it
/// changes.
pub struct ValueSource {
    value: Property<f64>,
}

impl ValueSource {
    pub fn new(value: f64) -> Self {
        Self {
            value: Property::new("value", value),
        }
    }

    /// Handle for changing the published value.
    pub fn value(&self) -> Property<f64> {
        self.value.clone()
    }
}

impl Processor for ValueSource {
    fn display_name(&self) -> &str {
        "Value"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn properties(&self) -> Vec<PropertyRef> {
        vec![self.value.handle()]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        ctx.set_output(0, self.value.get())
    }
}
