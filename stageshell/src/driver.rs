//! Top-level execution driver.
//!
//! The driver ties the lifecycle together: initialize, load args, run the
//! stage logic, then route to exactly one of `complete` or `fail`. Every
//! fault raised from args loading onward (a stage error, a stage panic, a
//! malformed record, a store fault) is caught at this single outermost
//! scope and converted into a durable failure record. Only faults before
//! the store is bound surface through the process exit code.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use crate::context::InvocationContext;
use crate::errors::{FailureReport, InitializationError, ShellError, StageLogicFault};
use crate::observability;
use crate::record::Record;

/// User-authored stage logic.
///
/// Implementations read the loaded args record and mutate the outs record
/// in place. Any returned error propagates to the driver unmodified and is
/// recorded as a stage-code fault. The logic object is resolved by the
/// embedding binary at process startup.
pub trait StageLogic: Send + Sync {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against the loaded args, populating `outs`.
    ///
    /// # Errors
    ///
    /// Any error aborts the invocation and is recorded as a failure.
    fn execute(&self, args: &Record, outs: &mut Record) -> anyhow::Result<()>;
}

/// A function-based stage logic.
pub struct FnStageLogic<F>
where
    F: Fn(&Record, &mut Record) -> anyhow::Result<()> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStageLogic<F>
where
    F: Fn(&Record, &mut Record) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates a new function-based stage logic.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStageLogic<F>
where
    F: Fn(&Record, &mut Record) -> anyhow::Result<()> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStageLogic")
            .field("name", &self.name)
            .finish()
    }
}

impl<F> StageLogic for FnStageLogic<F>
where
    F: Fn(&Record, &mut Record) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, args: &Record, outs: &mut Record) -> anyhow::Result<()> {
        (self.func)(args, outs)
    }
}

/// The terminal routing decision for one bound invocation.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The invocation completed; the success marker is durable.
    Completed,
    /// The invocation failed; the report was written (best effort).
    Failed(FailureReport),
}

impl InvocationOutcome {
    /// Returns true if the invocation completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Drives one bound invocation to its terminal state.
///
/// On any fault from args loading onward the context's failure path is
/// taken; the returned outcome reflects the terminal routing decision.
pub fn execute_invocation(
    ctx: &mut InvocationContext,
    logic: &dyn StageLogic,
) -> InvocationOutcome {
    match drive(ctx, logic) {
        Ok(()) => InvocationOutcome::Completed,
        Err(err) => {
            let report = FailureReport::from_shell_error(&err, ctx.run_id());
            ctx.fail(&report);
            InvocationOutcome::Failed(report)
        }
    }
}

fn drive(ctx: &mut InvocationContext, logic: &dyn StageLogic) -> Result<(), ShellError> {
    let args = ctx.load_args()?;
    let mut outs = Record::new();
    ctx.begin_execution()?;
    tracing::info!(stage = logic.name(), run_id = %ctx.run_id(), "stage logic starting");
    run_logic(logic, &args, &mut outs)?;
    ctx.complete(&outs)?;
    Ok(())
}

/// Invokes stage logic, converting returned errors and panics into faults.
fn run_logic(
    logic: &dyn StageLogic,
    args: &Record,
    outs: &mut Record,
) -> Result<(), ShellError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| logic.execute(args, outs)));
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(fault)) => Err(ShellError::StageLogic(StageLogicFault::from_error(&fault))),
        Err(payload) => Err(ShellError::StageLogic(StageLogicFault::from_panic(
            panic_message(payload.as_ref()),
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage logic panicked".to_string()
    }
}

/// Runs one stage invocation from a process argument vector.
///
/// Returns the outcome of the bound invocation, or the initialization
/// error if no store could be bound.
///
/// # Errors
///
/// Returns `InitializationError` on a pre-binding fault; such faults
/// cannot be reported through the metadata protocol.
pub fn try_run<I, S>(
    logic: &dyn StageLogic,
    argv: I,
) -> Result<InvocationOutcome, InitializationError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut ctx = InvocationContext::initialize(argv)?;
    Ok(execute_invocation(&mut ctx, logic))
}

/// Process entry point for an embedding binary.
///
/// The exit code communicates only catastrophic pre-binding failure; stage
/// success or failure is communicated through the metadata markers.
pub fn run<I, S>(logic: &dyn StageLogic, argv: I) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    observability::init_logging();
    match try_run(logic, argv) {
        Ok(outcome) => {
            if let InvocationOutcome::Failed(report) = &outcome {
                tracing::warn!(stage = logic.name(), message = %report.message, "stage failed");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "initialization failed");
            eprintln!("stageshell: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MetadataKey, MetadataStore};
    use crate::testing::{
        assert_invocation_completed, assert_invocation_failed, InMemoryStore,
    };
    use serde_json::json;

    fn squaring_stage() -> impl StageLogic {
        FnStageLogic::new("square", |args: &Record, outs: &mut Record| {
            let n = args
                .get("n")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| anyhow::anyhow!("missing numeric arg: n"))?;
            outs.set("result", json!(n * n));
            Ok(())
        })
    }

    fn memory_context(raw_args: &str) -> (InMemoryStore, InvocationContext) {
        let store = InMemoryStore::new().with_entry(&MetadataKey::Args, raw_args);
        let ctx = InvocationContext::with_store(Box::new(store.clone()));
        (store, ctx)
    }

    #[test]
    fn test_scenario_a_success_end_to_end() {
        // args {"n": 3}, logic squares it: outs entry, completion marker,
        // no failure marker.
        let dir = tempfile::tempdir().unwrap();
        let seed = FileStore::new(dir.path());
        seed.write(&MetadataKey::Args, r#"{"n": 3}"#).unwrap();

        let logic = squaring_stage();
        let outcome = try_run(
            &logic,
            ["stageshell", dir.path().to_str().unwrap()],
        )
        .unwrap();

        assert!(outcome.is_completed());
        let observer = FileStore::new(dir.path());
        assert_invocation_completed(&observer);

        let outs: serde_json::Value =
            serde_json::from_str(&observer.read(&MetadataKey::Outs).unwrap()).unwrap();
        assert_eq!(outs, json!({"result": 9}));
    }

    #[test]
    fn test_scenario_b_malformed_args() {
        let (store, mut ctx) = memory_context(r#"{"n": "#);
        let logic = squaring_stage();

        let outcome = execute_invocation(&mut ctx, &logic);

        assert!(!outcome.is_completed());
        assert_invocation_failed(&store);

        let report: FailureReport =
            serde_json::from_str(&store.entry(&MetadataKey::Errors).unwrap()).unwrap();
        assert_eq!(report.kind, crate::errors::FaultKind::Runtime);
        assert_eq!(report.category, "malformed_record");
        assert!(report.message.contains("invalid record syntax"));
    }

    #[test]
    fn test_scenario_c_fault_after_partial_outs() {
        let (store, mut ctx) = memory_context(r#"{"n": 3}"#);
        let logic = FnStageLogic::new("partial", |_args: &Record, outs: &mut Record| {
            outs.set("partial", json!(1));
            anyhow::bail!("gave up halfway")
        });

        let outcome = execute_invocation(&mut ctx, &logic);

        assert!(!outcome.is_completed());
        // The partial outs value must not be exposed.
        assert_invocation_failed(&store);

        let report: FailureReport =
            serde_json::from_str(&store.entry(&MetadataKey::Errors).unwrap()).unwrap();
        assert_eq!(report.kind, crate::errors::FaultKind::StageCode);
        assert_eq!(report.message, "gave up halfway");
        assert!(!report.trace.is_empty());
    }

    #[test]
    fn test_stage_panic_is_routed_to_fail() {
        let (store, mut ctx) = memory_context("{}");
        let logic = FnStageLogic::new("panicky", |_args: &Record, _outs: &mut Record| {
            panic!("unexpected condition")
        });

        let outcome = execute_invocation(&mut ctx, &logic);

        assert!(!outcome.is_completed());
        assert_invocation_failed(&store);

        let report: FailureReport =
            serde_json::from_str(&store.entry(&MetadataKey::Errors).unwrap()).unwrap();
        assert_eq!(report.message, "unexpected condition");
        assert_eq!(report.trace, vec!["panic: unexpected condition".to_string()]);
    }

    #[test]
    fn test_exactly_one_marker_per_invocation() {
        let (store, mut ctx) = memory_context(r#"{"n": 2}"#);
        let logic = squaring_stage();

        execute_invocation(&mut ctx, &logic);

        assert!(store.exists(&MetadataKey::Complete));
        assert!(!store.exists(&MetadataKey::Errors));
    }

    #[test]
    fn test_store_fault_during_complete_routes_to_fail() {
        let (store, mut ctx) = memory_context(r#"{"n": 2}"#);
        store.fail_writes_of(&MetadataKey::Outs);
        let logic = squaring_stage();

        let outcome = execute_invocation(&mut ctx, &logic);

        assert!(!outcome.is_completed());
        assert!(store.exists(&MetadataKey::Errors));
        assert!(!store.exists(&MetadataKey::Complete));
    }

    #[test]
    fn test_crash_injection_across_the_success_path() {
        // Kill the store after each write step; whatever the orchestrator
        // observes must be a valid protocol state.
        for surviving_writes in 0..=3 {
            let store =
                InMemoryStore::new().with_entry(&MetadataKey::Args, r#"{"n": 2}"#);
            let mut ctx = InvocationContext::with_store(Box::new(store.clone()));
            store.crash_after_writes(surviving_writes);
            let logic = squaring_stage();

            execute_invocation(&mut ctx, &logic);

            let complete = store.exists(&MetadataKey::Complete);
            let errors = store.exists(&MetadataKey::Errors);
            assert!(
                !(complete && errors),
                "both markers visible after {surviving_writes} writes"
            );
            if complete {
                assert!(
                    store.exists(&MetadataKey::Outs),
                    "completion marker visible without outs"
                );
            }
        }
    }

    #[test]
    fn test_try_run_pre_binding_failure() {
        let logic = squaring_stage();
        let result = try_run(&logic, ["stageshell"]);

        assert!(matches!(
            result,
            Err(InitializationError::MissingWorkingDir)
        ));
    }

    #[test]
    fn test_fn_stage_logic_name_and_debug() {
        let logic = FnStageLogic::new("noop", |_: &Record, _: &mut Record| Ok(()));
        assert_eq!(logic.name(), "noop");
        assert!(format!("{logic:?}").contains("noop"));
    }
}
