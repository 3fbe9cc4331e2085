//! Shared services for a network: diagnostics, the worker pool, the front
//! queue completions come back through and the queue of changed properties.

use super::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use super::pool::{FrontQueue, WorkerPool};
use super::property::PropertyQueue;
use crate::config::EngineConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub struct EngineContext {
    diagnostics: Arc<dyn DiagnosticSink>,
    pool: WorkerPool,
    front_queue: FrontQueue,
    property_queue: PropertyQueue,
    catch_panics: bool,
    completion_timeout: Duration,
}

impl EngineContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            diagnostics: Arc::new(TracingSink),
            pool: WorkerPool::new(config.workers.threads, config.workers.thread_name.clone()),
            front_queue: FrontQueue::new(),
            property_queue: PropertyQueue::new(),
            catch_panics: config.evaluation.catch_panics,
            completion_timeout: Duration::from_millis(config.evaluation.completion_timeout_ms),
        }
    }

    /// Replace the diagnostic sink (the default logs through `tracing`).
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(&diagnostic);
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn front_queue(&self) -> &FrontQueue {
        &self.front_queue
    }

    pub fn property_queue(&self) -> &PropertyQueue {
        &self.property_queue
    }

    pub fn catch_panics(&self) -> bool {
        self.catch_panics
    }

    pub fn completion_timeout(&self) -> Duration {
        self.completion_timeout
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("pool", &self.pool)
            .field("queued", &self.front_queue.len())
            .field("properties", &self.property_queue)
            .field("catch_panics", &self.catch_panics)
            .field("completion_timeout", &self.completion_timeout)
            .finish()
    }
}
