//! Dataflow processor network.
//!
//! Processors are wired into a graph through typed ports. Changing an input
//! invalidates everything downstream; an evaluation pass then walks the graph
//! in dependency order and re-runs exactly the processors that became invalid.
//!
//! # Architecture
//!
//! ```text
//! [ValueSource] ──► [Sum] ──► [Scale] ──► [Collector]
//!       │             ▲
//! [ValueSource] ──────┘        (multi inport)
//!
//! ProcessorNetwork ── lock / observers / identifiers
//!   ├── Graph              arena of ProcessorSlot + connections
//!   ├── NetworkEvaluator   cached Kahn order, per-node fault isolation
//!   ├── links              PropertyLink list, followed on property changes
//!   └── EngineContext      diagnostics sink, worker pool, front queue,
//!                          property queue
//! ```
//!
//! # Design
//!
//! - **Arena + handles**: `ProcessorId` indexes a slot vector, never reused.
//! - **Typed port handles**: `OutportId` / `InportId`, so a connection can't
//!   be made in the wrong direction.
//! - **Capability queries**: the trait says whether a processor is async or a
//!   sink; nothing downcasts.
//! - **Explicit engine context**: no global singletons.
//! - **Channel continuation**: async work and property changes come back
//!   through crossbeam channels and are applied on the network thread.

pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod id;
pub mod invalidation;
pub mod lock;
pub mod multi_inport;
pub mod observer;
pub mod pool;
pub mod port;
pub mod processor;
pub mod processor_network;
pub mod property;
pub mod topology;

pub use connection::Connection;
pub use context::{InportState, InportStates, InputSource, OutputBuffer, ProcessContext};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use engine::EngineContext;
pub use error::{NetworkError, NetworkResult, ProcessorError};
pub use evaluator::{NetworkEvaluator, PassReport};
pub use graph::Graph;
pub use id::{InportId, OutportId, PortId, ProcessorId};
pub use invalidation::InvalidationLevel;
pub use lock::NetworkLock;
pub use multi_inport::{AnyInport, MultiInport};
pub use observer::{NetworkEvent, ObserverRegistry, Subscription};
pub use pool::{Completion, FrontQueue, Job, JobResult, LivenessToken, StopToken, WorkerPool};
pub use port::{DataType, Inport, Outport, PortArity, PortData, PortDescriptor, PortDirection};
pub use processor::{Capabilities, LifecycleState, Processor, ProcessorSlot};
pub use processor_network::ProcessorNetwork;
pub use property::{AnyProperty, Property, PropertyId, PropertyLink, PropertyQueue, PropertyRef};
pub use topology::{EvaluationPlan, PlanStats, TopologyCompiler};
