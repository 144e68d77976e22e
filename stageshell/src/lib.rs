//! # Stageshell
//!
//! The execution boundary for a single pipeline stage.
//!
//! Stageshell is the short-lived process side of a pipeline orchestrator:
//! it binds a durable metadata store to one working directory, loads the
//! stage's input record, runs user-supplied stage logic, persists outputs,
//! and signals completion or failure through metadata markers:
//!
//! - **Lifecycle protocol**: initialize, load args, execute, persist outs,
//!   then signal completion, with a failure path reachable from any
//!   post-binding fault
//! - **Ordered records**: lossless, insertion-ordered input/output data
//! - **Durable metadata entries**: `_args`, `_outs`, `_log`, `_complete`,
//!   `_errors` files the orchestrator interprets deterministically
//! - **Structured failure records**: message, classification, and trace
//!   for every fault, including stage panics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageshell::prelude::*;
//!
//! fn main() -> std::process::ExitCode {
//!     let logic = FnStageLogic::new("square", |args, outs| {
//!         let n = args.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
//!         outs.set("result", serde_json::json!(n * n));
//!         Ok(())
//!     });
//!     stageshell::driver::run(&logic, std::env::args())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bootstrap;
pub mod context;
pub mod driver;
pub mod errors;
pub mod observability;
pub mod record;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bootstrap::BootstrapArgs;
    pub use crate::context::{InvocationContext, InvocationState};
    pub use crate::driver::{
        execute_invocation, run, try_run, FnStageLogic, InvocationOutcome, StageLogic,
    };
    pub use crate::errors::{
        FailureReport, FaultKind, InitializationError, LifecycleError,
        MalformedRecordError, ShellError, StageLogicFault, StoreError,
    };
    pub use crate::observability::LogTrailer;
    pub use crate::record::Record;
    pub use crate::store::{FileStore, MetadataKey, MetadataStore, StoreOptions};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
