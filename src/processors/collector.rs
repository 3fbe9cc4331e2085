//! Collector: sink that records every value it receives.

use super::SCALAR;
use crate::network::{PortDescriptor, ProcessContext, Processor, ProcessorError};
use std::sync::{Arc, Mutex, PoisonError};

static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in", SCALAR)];

/// Values a [`Collector`] has seen, oldest first. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct Recording(Arc<Mutex<Vec<f64>>>);

impl Recording {
    pub fn get(&self) -> Vec<f64> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<f64> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn push(&self, value: f64) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }
}

/// Appends its input to a shared [`Recording`] on every run.
pub struct Collector {
    values: Recording,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            values: Recording::default(),
        }
    }

    pub fn values(&self) -> Recording {
        self.values.clone()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Collector {
    fn display_name(&self) -> &str {
        "Collector"
    }

    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = *ctx.input::<f64>(0)?;
        self.values.push(value);
        Ok(())
    }
}
