//! Crate-wide error types.
//!
//! Each submodule defines its own `thiserror` error enum for the failures
//! it can produce; `EngineError` aggregates them at the top-level `Execute`
//! boundary so callers have one type to match on.

use thiserror::Error;

use crate::budget::BudgetError;
use crate::dlq::DlqError;
use crate::executor::ExecutorError;
use crate::rules::RuleError;
use crate::security::SecurityError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Dlq(#[from] DlqError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
