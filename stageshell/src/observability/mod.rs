//! Logging setup and the persisted end-of-log trailer.
//!
//! Diagnostic logging goes through `tracing`; the log level is taken from
//! the `STAGESHELL_LOG` environment variable (e.g. "info", "debug") and
//! defaults to `info`. The [`LogTrailer`] is the structured end-of-run
//! record persisted to the `log` metadata entry before the terminal marker.

use std::fmt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::utils::iso_timestamp;

/// Environment variable controlling the log filter.
pub const LOG_ENV_VAR: &str = "STAGESHELL_LOG";

/// Initialises the global logging subscriber.
///
/// Safe to call more than once; later calls are no-ops. Embedding binaries
/// that install their own subscriber can simply skip this.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// The end-of-log trailer persisted before a terminal marker.
///
/// The trailer is written to the `log` entry after outputs (success) or the
/// failure record, and before the terminal marker itself, so an orchestrator
/// that observes a marker can always also observe the trailer.
#[derive(Debug, Clone)]
pub struct LogTrailer {
    /// The invocation's run id.
    pub run_id: Uuid,
    /// The terminal outcome being recorded: `complete` or `failed`.
    pub outcome: String,
    /// ISO 8601 timestamp of the end of execution.
    pub ended_at: String,
}

impl LogTrailer {
    /// Creates a trailer stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, outcome: impl Into<String>) -> Self {
        Self {
            run_id,
            outcome: outcome.into(),
            ended_at: iso_timestamp(),
        }
    }
}

impl fmt::Display for LogTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run: {}", self.run_id)?;
        writeln!(f, "outcome: {}", self.outcome)?;
        writeln!(f, "end: {}", self.ended_at)
    }
}
