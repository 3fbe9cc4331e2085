//! Scale: multiplies its input by a factor.

use super::SCALAR;
use crate::network::{
    PortDescriptor, ProcessContext, Processor, ProcessorError, Property, PropertyRef,
};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", SCALAR),
    PortDescriptor::output("out", SCALAR),
];

pub struct Scale {
    factor: Property<f64>,
}

impl Scale {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: Property::new("factor", factor),
        }
    }

    pub fn factor(&self) -> Property<f64> {
        self.factor.clone()
    }
}

impl Processor for Scale {
    fn display_name(&self) -> &str {
        "Scale"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn properties(&self) -> Vec<PropertyRef> {
        vec![self.factor.handle()]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = *ctx.input::<f64>(0)?;
        ctx.set_output(0, value * self.factor.get())
    }
}
