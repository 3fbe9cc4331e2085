//! # procflow: incremental dataflow evaluation
//!
//! Processors are wired into a graph through typed ports; when an input
//! changes, everything downstream is invalidated and the next evaluation pass
//! re-runs exactly those processors, in dependency order.
//!
//! ## Architecture
//!
//! - **Network**: arena of processors and connections with a re-entrant lock
//!   for batched edits and observers for structural changes
//! - **Evaluator**: cached topological order, per-processor fault isolation,
//!   cycle detection without side effects
//! - **Workers**: asynchronous processors hand jobs to a tokio blocking pool;
//!   results come back through a crossbeam channel to the network thread
//! - **Diagnostics**: evaluation faults go to a pluggable sink instead of
//!   unwinding into the caller
//!
//! ## Configuration
//!
//! Engine settings are read from `engine.toml` (or `.json`) in the platform
//! config directory under `dev.procflow`:
//!
//! - **Linux**: `~/.config/dev.procflow/`
//! - **macOS**: `~/Library/Application Support/dev.procflow/`
//! - **Windows**: `%APPDATA%\dev.procflow\`
//!
//! ## Example
//!
//! ```ignore
//! use procflow::network::ProcessorNetwork;
//! use procflow::processors::{Collector, Scale, ValueSource};
//!
//! let mut network = ProcessorNetwork::new();
//! let source = ValueSource::new(2.0);
//! let value = source.value();
//! let collector = Collector::new();
//! let seen = collector.values();
//!
//! let mut batch = network.batch();
//! let a = batch.add_processor(source)?;
//! let b = batch.add_processor(Scale::new(10.0))?;
//! let c = batch.add_processor(collector)?;
//! batch.add_connection(a.outport(0), b.inport(0))?;
//! batch.add_connection(b.outport(0), c.inport(0))?;
//! drop(batch); // one pass: seen == [20.0]
//!
//! value.set(3.0);
//! network.evaluate()?; // seen == [20.0, 30.0]
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod processors;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{FlowError, Result};
pub use network::{
    Connection, Diagnostic, DiagnosticKind, DiagnosticSink, EngineContext, InvalidationLevel,
    NetworkError, NetworkEvent, NetworkResult, PortDescriptor, ProcessContext, Processor,
    ProcessorError, ProcessorId, ProcessorNetwork, Property, PropertyId, PropertyLink,
};
