//! Error types for the stageshell runtime.
//!
//! The taxonomy follows the invocation protocol: pre-binding faults are
//! fatal and unreportable, everything after the store is bound converts
//! into a durable [`FailureReport`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::iso_timestamp;

/// The unified error type for invocation lifecycle operations.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A pre-binding initialization fault.
    #[error("{0}")]
    Initialization(#[from] InitializationError),

    /// A stored record could not be parsed or flattened.
    #[error("{0}")]
    MalformedRecord(#[from] MalformedRecordError),

    /// An I/O fault from the metadata store.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A fault raised by the external stage logic.
    #[error("{0}")]
    StageLogic(#[from] StageLogicFault),

    /// A lifecycle operation was attempted in the wrong state.
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Error raised when bootstrap arguments cannot bind a working directory.
///
/// This is fatal: without a bound store there is no metadata channel to
/// report through, so the process exits non-zero instead.
#[derive(Debug, Clone, Error)]
pub enum InitializationError {
    /// No working directory argument was supplied.
    #[error("missing working directory argument")]
    MissingWorkingDir,

    /// The working directory does not exist.
    #[error("working directory does not exist: {path}")]
    WorkingDirNotFound {
        /// The missing path.
        path: String,
    },

    /// The working directory path is not a directory.
    #[error("working directory is not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },
}

/// Error raised when a stored record violates the record schema.
#[derive(Debug, Clone, Error)]
pub enum MalformedRecordError {
    /// The stored value is not a JSON object.
    #[error("record is not a JSON object: found {found}")]
    NotAnObject {
        /// The JSON type that was found instead.
        found: String,
    },

    /// A field name appears more than once.
    #[error("duplicate field name: {name}")]
    DuplicateField {
        /// The duplicated field name.
        name: String,
    },

    /// The stored value is not valid JSON.
    #[error("invalid record syntax: {message}")]
    Syntax {
        /// The parser's diagnostic.
        message: String,
    },
}

/// I/O fault raised by a metadata store.
///
/// Store faults are never retried here; retry policy belongs to the
/// orchestrator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named entry does not exist.
    #[error("metadata entry not found: {key}")]
    NotFound {
        /// The entry name.
        key: String,
    },

    /// An I/O fault occurred while reading or writing an entry.
    #[error("metadata I/O fault on entry {key}: {source}")]
    Io {
        /// The entry name.
        key: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A fault raised by the external stage logic.
#[derive(Debug, Clone, Error)]
#[error("stage logic fault: {message}")]
pub struct StageLogicFault {
    /// The fault message.
    pub message: String,
    /// The fault's cause chain, outermost first.
    pub trace: Vec<String>,
}

impl StageLogicFault {
    /// Captures a fault returned by stage logic.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            trace: err.chain().map(ToString::to_string).collect(),
        }
    }

    /// Captures a panic raised inside stage logic.
    #[must_use]
    pub fn from_panic(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            trace: vec![format!("panic: {message}")],
            message,
        }
    }
}

/// Error raised when a lifecycle operation is attempted in the wrong state.
///
/// Terminal states absorb: once a completion or failure marker is written,
/// no further mutation of the invocation's metadata is permitted.
#[derive(Debug, Clone, Error)]
#[error("cannot {operation} while invocation is {state}")]
pub struct LifecycleError {
    /// The rejected operation.
    pub operation: String,
    /// The state the invocation was in.
    pub state: String,
}

impl LifecycleError {
    /// Creates a new lifecycle error.
    #[must_use]
    pub fn new(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            state: state.into(),
        }
    }
}

/// Classification of a recorded fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The fault originated in user-authored stage logic.
    StageCode,
    /// The fault originated in the runtime (parsing, store I/O, lifecycle).
    Runtime,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageCode => write!(f, "stage_code"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// The durable record of an execution fault.
///
/// Written once to the `errors` entry during failure finalization, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    /// The fault message.
    pub message: String,
    /// Classification of the fault.
    pub kind: FaultKind,
    /// The taxonomy variant that raised the fault, e.g. `malformed_record`.
    pub category: String,
    /// The fault's cause chain, outermost first. Never empty.
    pub trace: Vec<String>,
    /// The invocation's run id.
    pub run_id: Uuid,
    /// ISO 8601 timestamp of when the fault was recorded.
    pub raised_at: String,
}

impl FailureReport {
    /// Creates a new failure report stamped with the current time.
    #[must_use]
    pub fn new(
        kind: FaultKind,
        message: impl Into<String>,
        trace: Vec<String>,
        run_id: Uuid,
    ) -> Self {
        let message = message.into();
        let trace = if trace.is_empty() {
            vec![message.clone()]
        } else {
            trace
        };
        Self {
            message,
            category: kind.to_string(),
            kind,
            trace,
            run_id,
            raised_at: iso_timestamp(),
        }
    }

    /// Sets the taxonomy category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builds a report from a lifecycle error, classifying it.
    #[must_use]
    pub fn from_shell_error(err: &ShellError, run_id: Uuid) -> Self {
        let category = shell_error_category(err);
        match err {
            ShellError::StageLogic(fault) => Self::new(
                FaultKind::StageCode,
                fault.message.clone(),
                fault.trace.clone(),
                run_id,
            )
            .with_category(category),
            other => Self::new(
                FaultKind::Runtime,
                other.to_string(),
                error_chain_trace(other),
                run_id,
            )
            .with_category(category),
        }
    }
}

/// Returns the taxonomy name of a lifecycle error.
fn shell_error_category(err: &ShellError) -> &'static str {
    match err {
        ShellError::Initialization(_) => "initialization",
        ShellError::MalformedRecord(_) => "malformed_record",
        ShellError::Store(_) => "store",
        ShellError::StageLogic(_) => "stage_logic",
        ShellError::Lifecycle(_) => "lifecycle",
    }
}

/// Collects an error's cause chain as display strings, outermost first.
///
/// Adjacent duplicate frames (from transparent wrappers) are collapsed.
#[must_use]
pub fn error_chain_trace(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut frames = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        frames.push(cause.to_string());
        source = cause.source();
    }
    frames.dedup();
    frames
}
