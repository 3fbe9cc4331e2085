//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod probes;

use procflow::network::{EngineContext, MemorySink, ProcessorNetwork};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for waiting on background jobs
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Network whose diagnostics are kept in memory for inspection
pub fn recording_network() -> (ProcessorNetwork, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let engine = EngineContext::default().with_diagnostics(sink.clone());
    (ProcessorNetwork::with_context(engine), sink)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
