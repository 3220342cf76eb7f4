//! Workflow Executor (C8) — action dispatch, cancellation scopes, and the
//! per-action retry/DLQ run loop.

pub mod actions;
pub mod cancellation;
pub mod run;
pub mod types;

pub use actions::{ActionDeps, ActionOutcome};
pub use cancellation::{CancellationScope, ScopeOutcome};
pub use run::{ExecutorError, WorkflowExecutor};
pub use types::{
    ActionResult, ActionSpec, ActionStatus, Envelope, ExecutionContext, Intent, LogRecord,
    RunStatus,
};
