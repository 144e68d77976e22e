//! Invocation lifecycle context.
//!
//! The [`InvocationContext`] is the sole owner of lifecycle state for one
//! stage invocation and mediates every metadata store call, so outside code
//! never touches the store directly. An invocation moves through
//! `Initialized`, `ArgsLoaded`, and `Running`, and ends in exactly one of
//! `Complete` or `Failed`.


use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::bootstrap::BootstrapArgs;
use crate::errors::{
    FailureReport, InitializationError, LifecycleError, ShellError, StoreError,
};
use crate::observability::LogTrailer;
use crate::record::Record;
use crate::store::{FileStore, MetadataKey, MetadataStore};
use crate::utils::{generate_uuid, iso_timestamp};

/// The lifecycle state of a stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// The store is bound; args have not been loaded yet.
    Initialized,
    /// The args record has been loaded and parsed.
    ArgsLoaded,
    /// Stage logic is executing.
    Running,
    /// The invocation completed; the success marker is durable.
    Complete,
    /// The invocation failed; the failure record is durable (best effort).
    Failed,
}

impl InvocationState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::ArgsLoaded => write!(f, "args_loaded"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Owns the metadata store and lifecycle state for one stage invocation.
pub struct InvocationContext {
    store: Box<dyn MetadataStore>,
    state: InvocationState,
    run_id: Uuid,
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("state", &self.state)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl InvocationContext {
    /// Parses bootstrap arguments and binds a file store to the working
    /// directory they identify.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError` if the working directory argument is
    /// missing or malformed. This is fatal; there is no fallback.
    pub fn initialize<I, S>(argv: I) -> Result<Self, InitializationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bootstrap = BootstrapArgs::parse(argv)?;
        Ok(Self::for_bootstrap(&bootstrap))
    }

    /// Binds a file store to an already-parsed working directory.
    #[must_use]
    pub fn for_bootstrap(bootstrap: &BootstrapArgs) -> Self {
        Self::with_store(Box::new(FileStore::new(bootstrap.working_dir())))
    }

    /// Builds a context over an explicit store.
    ///
    /// Tests use this with an in-memory store; embedders can supply their
    /// own store implementation.
    #[must_use]
    pub fn with_store(store: Box<dyn MetadataStore>) -> Self {
        let run_id = generate_uuid();
        tracing::debug!(%run_id, "invocation context bound");
        Self {
            store,
            state: InvocationState::Initialized,
            run_id,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Returns the invocation's run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Reads and parses the `args` entry.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Store` if the entry cannot be read,
    /// `ShellError::MalformedRecord` if it cannot be parsed, or
    /// `ShellError::Lifecycle` if args were already loaded.
    pub fn load_args(&mut self) -> Result<Record, ShellError> {
        self.guard("load args", InvocationState::Initialized)?;
        let raw = self.store.read(&MetadataKey::Args)?;
        let args = Record::from_stored(&raw)?;
        self.state = InvocationState::ArgsLoaded;
        tracing::debug!(fields = args.len(), "stage args loaded");
        Ok(args)
    }

    /// Marks the start of stage logic execution.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Lifecycle` unless args have just been loaded.
    pub fn begin_execution(&mut self) -> Result<(), ShellError> {
        self.guard("begin execution", InvocationState::ArgsLoaded)?;
        self.state = InvocationState::Running;
        Ok(())
    }

    /// Finalizes a successful invocation.
    ///
    /// Flattens `outs`, writes it to the `outs` entry, writes the log
    /// trailer, then writes the completion marker, in that order. The outs
    /// value is durable strictly before the marker, so an orchestrator that
    /// observes the marker can always observe the final outs.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Lifecycle` if the invocation is not running or
    /// already terminal, `ShellError::MalformedRecord` if `outs` cannot be
    /// flattened, or `ShellError::Store` on an I/O fault. On error the
    /// invocation is not terminal and the caller routes to [`fail`].
    ///
    /// [`fail`]: InvocationContext::fail
    pub fn complete(&mut self, outs: &Record) -> Result<(), ShellError> {
        self.guard("complete", InvocationState::Running)?;
        let flattened = outs.flatten()?;
        self.store.write(&MetadataKey::Outs, &flattened)?;
        self.write_trailer("complete")?;
        self.store.write(&MetadataKey::Complete, &iso_timestamp())?;
        self.state = InvocationState::Complete;
        tracing::info!(run_id = %self.run_id, "invocation complete");
        Ok(())
    }

    /// Finalizes a failed invocation.
    ///
    /// Writes the serialized failure report to the `errors` entry, then the
    /// log trailer. The `errors` entry is the failure marker; partial outs
    /// are never written. This operation must be reachable from any
    /// post-binding fault and never returns an error itself: if the report
    /// cannot be written, a minimal marker write is attempted before giving
    /// up with a logged error.
    pub fn fail(&mut self, report: &FailureReport) {
        if self.state.is_terminal() {
            tracing::warn!(
                state = %self.state,
                "fail called on terminal invocation; ignoring"
            );
            return;
        }
        self.state = InvocationState::Failed;

        let payload = serde_json::to_string_pretty(report)
            .unwrap_or_else(|_| minimal_failure_payload(report));
        if let Err(err) = self.store.write(&MetadataKey::Errors, &payload) {
            tracing::error!(%err, "failed to write failure record; retrying with minimal marker");
            if let Err(err) = self
                .store
                .write(&MetadataKey::Errors, &minimal_failure_payload(report))
            {
                tracing::error!(%err, "failed to write minimal failure marker; giving up");
            }
            return;
        }

        if let Err(err) = self.write_trailer("failed") {
            // The failure marker is already durable; the trailer is advisory.
            tracing::error!(%err, "failed to write log trailer after failure record");
        }
        tracing::warn!(run_id = %self.run_id, kind = %report.kind, "invocation failed");
    }

    fn write_trailer(&self, outcome: &str) -> Result<(), StoreError> {
        let trailer = LogTrailer::new(self.run_id, outcome);
        self.store.write(&MetadataKey::Log, &trailer.to_string())
    }

    fn guard(
        &self,
        operation: &str,
        expected: InvocationState,
    ) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError::new(operation, self.state.to_string()))
        }
    }
}

/// Renders the smallest failure payload that still identifies the fault.
fn minimal_failure_payload(report: &FailureReport) -> String {
    serde_json::json!({
        "message": report.message,
        "kind": report.kind,
        "category": report.category,
    })
    .to_string()
}
