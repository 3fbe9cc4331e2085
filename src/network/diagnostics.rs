//! Diagnostics reported during evaluation.
//!
//! Evaluation errors are not thrown at whoever triggered the pass (an
//! invalidation, an unlock, an async completion). They are delivered to a
//! [`DiagnosticSink`] carried by the engine context instead.

use crate::network::error::NetworkError;
use crate::network::id::ProcessorId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    CycleDetected,
    ProcessorFault,
    AsyncFault,
    DanglingReference,
    Initialization,
    /// A rejected edit: unknown handle, incompatible connection, bad layout.
    Structural,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::CycleDetected | DiagnosticKind::DanglingReference => Severity::Error,
            DiagnosticKind::ProcessorFault
            | DiagnosticKind::AsyncFault
            | DiagnosticKind::Initialization
            | DiagnosticKind::Structural => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub processor: Option<ProcessorId>,
    pub identifier: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            processor: None,
            identifier: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_processor(mut self, processor: ProcessorId, identifier: impl Into<String>) -> Self {
        self.processor = Some(processor);
        self.identifier = Some(identifier.into());
        self
    }

    pub fn from_error(error: &NetworkError) -> Self {
        match error {
            NetworkError::CycleDetected { .. } => {
                Self::new(DiagnosticKind::CycleDetected, error.to_string())
            }
            NetworkError::ProcessorFault {
                processor,
                identifier,
                message,
            } => Self::new(DiagnosticKind::ProcessorFault, message.clone())
                .with_processor(*processor, identifier.clone()),
            NetworkError::Initialization { identifier, .. } => {
                let mut diagnostic = Self::new(DiagnosticKind::Initialization, error.to_string());
                diagnostic.identifier = Some(identifier.clone());
                diagnostic
            }
            NetworkError::DanglingReference(_) => {
                Self::new(DiagnosticKind::DanglingReference, error.to_string())
            }
            NetworkError::PortLayout { identifier, .. } => {
                let mut diagnostic = Self::new(DiagnosticKind::Structural, error.to_string());
                diagnostic.identifier = Some(identifier.clone());
                diagnostic
            }
            NetworkError::IncompatibleConnection { .. }
            | NetworkError::UnknownProcessor(_)
            | NetworkError::UnknownPort(_)
            | NetworkError::DuplicateIdentifier(_)
            | NetworkError::ProcessorLimit(_)
            | NetworkError::UnknownProperty(_)
            | NetworkError::IncompatibleLink { .. } => {
                Self::new(DiagnosticKind::Structural, error.to_string())
            }
        }
    }
}

/// Receives evaluation diagnostics. Called on the network thread only.
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let identifier = diagnostic.identifier.as_deref().unwrap_or("-");
        match diagnostic.severity {
            Severity::Error => tracing::error!(
                kind = ?diagnostic.kind,
                processor = identifier,
                "{}",
                diagnostic.message
            ),
            Severity::Warning => tracing::warn!(
                kind = ?diagnostic.kind,
                processor = identifier,
                "{}",
                diagnostic.message
            ),
            Severity::Info => tracing::info!(
                kind = ?diagnostic.kind,
                processor = identifier,
                "{}",
                diagnostic.message
            ),
        }
    }
}

/// Keeps every diagnostic in memory. Useful for hosts that show a log panel.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.kind == kind)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        TracingSink.report(diagnostic);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
    }
}
