//! Scoped batching of network edits.

use super::processor_network::ProcessorNetwork;
use std::ops::{Deref, DerefMut};

/// Holds the network locked for as long as it lives. Nested guards (and
/// nested `lock()`/`unlock()` pairs) stack; evaluation runs when the last one
/// goes away.
///
/// ```ignore
/// let mut batch = network.batch();
/// let a = batch.add_processor(ValueSource::new(1.0))?;
/// let b = batch.add_processor(Scale::new(2.0))?;
/// batch.add_connection(a.outport(0), b.inport(0))?;
/// // one evaluation pass here
/// ```
pub struct NetworkLock<'a> {
    network: &'a mut ProcessorNetwork,
}

impl<'a> NetworkLock<'a> {
    pub(crate) fn new(network: &'a mut ProcessorNetwork) -> Self {
        network.lock();
        Self { network }
    }
}

impl Deref for NetworkLock<'_> {
    type Target = ProcessorNetwork;

    fn deref(&self) -> &Self::Target {
        &*self.network
    }
}

impl DerefMut for NetworkLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.network
    }
}

impl Drop for NetworkLock<'_> {
    fn drop(&mut self) {
        self.network.unlock();
    }
}
