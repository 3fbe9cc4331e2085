//! Network-specific error types.

use crate::network::connection::Connection;
use crate::network::id::{PortId, ProcessorId};
use crate::network::property::{PropertyId, PropertyLink};
use thiserror::Error;

/// Structural and evaluation errors raised by the network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Evaluation could not order these processors.
    #[error("Cycle detected in processor network ({} processors unschedulable)", .processors.len())]
    CycleDetected { processors: Vec<ProcessorId> },

    #[error("Incompatible connection {connection}: {reason}")]
    IncompatibleConnection {
        connection: Connection,
        reason: String,
    },

    #[error("Processor {processor} ('{identifier}') fault: {message}")]
    ProcessorFault {
        processor: ProcessorId,
        identifier: String,
        message: String,
    },

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Unknown processor {0}")]
    UnknownProcessor(ProcessorId),

    #[error("Unknown port {0:?}")]
    UnknownPort(PortId),

    #[error("Processor '{identifier}' failed to initialize: {message}")]
    Initialization { identifier: String, message: String },

    #[error("Invalid port layout for '{identifier}': {message}")]
    PortLayout { identifier: String, message: String },

    #[error("Identifier '{0}' is already in use")]
    DuplicateIdentifier(String),

    #[error("Processor arena exhausted after {0} insertions")]
    ProcessorLimit(usize),

    #[error("Unknown property {0}")]
    UnknownProperty(PropertyId),

    #[error("Incompatible link {link}: {reason}")]
    IncompatibleLink { link: PropertyLink, reason: String },
}

pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Errors a processor reports from `process()` or a background job.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("No data on inport {0}")]
    MissingInput(usize),

    #[error("Port {port} does not hold a {expected}")]
    TypeMismatch {
        port: usize,
        expected: &'static str,
    },

    #[error("No port named '{0}'")]
    NoSuchPort(String),

    #[error("Outport index {0} out of range")]
    OutputOutOfRange(usize),

    #[error("Processor does not support asynchronous work")]
    AsyncUnsupported,

    #[error("Panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcessorError::Failed(message.into())
    }

    /// Best-effort text for a panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        ProcessorError::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::id::{InportId, OutportId};

    #[test]
    fn test_cycle_display_counts_processors() {
        let err = NetworkError::CycleDetected {
            processors: vec![ProcessorId(0), ProcessorId(1)],
        };
        assert!(err.to_string().contains("2 processors"));
    }

    #[test]
    fn test_incompatible_connection_display() {
        let err = NetworkError::IncompatibleConnection {
            connection: Connection::new(
                OutportId::new(ProcessorId(0), 0),
                InportId::new(ProcessorId(1), 0),
            ),
            reason: "type mismatch".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Outport(0:0) -> Inport(1:0)"));
        assert!(text.contains("type mismatch"));
    }

    #[test]
    fn test_from_panic_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(
            ProcessorError::from_panic(boxed.as_ref()).to_string(),
            "Panicked: boom"
        );
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(
            ProcessorError::from_panic(boxed.as_ref()).to_string(),
            "Panicked: owned"
        );
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert!(ProcessorError::from_panic(boxed.as_ref())
            .to_string()
            .contains("non-string"));
    }

    #[test]
    fn test_anyhow_passthrough() {
        let err: ProcessorError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
