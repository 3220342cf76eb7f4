//! MOVA Engine
//!
//! A workflow-automation execution engine for "envelope" documents: a
//! declarative intent plus an ordered sequence of actions. Provides:
//!
//! - A Workflow Executor that dispatches actions (HTTP fetch, variable
//!   assignment, conditionals/loops as metadata, sleeps, JSONPath
//!   extraction) under nested cancellation scopes.
//! - A Retry Scheduler with fixed/linear/exponential backoff and jitter.
//! - A Budget Manager enforcing rolling-window quotas across retries,
//!   workflows, CPU, memory, API requests, and execution time.
//! - A Rule Engine and Policy Matcher for condition-driven routing and
//!   retry-policy selection.
//! - A file-backed Dead-Letter Queue for runs that exhaust their retries.
//! - An Alert Manager that dedupes and fans out budget violations.
//!
//! Outbound HTTP is gated by a URL/Host Guard, and anything that might
//! reach a log or a dead-letter entry passes through the secret redactor
//! first.

pub mod alerts;
pub mod budget;
pub mod config;
pub mod dlq;
pub mod error;
pub mod executor;
pub mod policy;
pub mod retry;
pub mod rules;
pub mod secrets;
pub mod security;

pub use config::{EngineConfig, SecurityPolicy};
pub use error::{EngineError, EngineResult};
pub use executor::{Envelope, ExecutionContext, WorkflowExecutor};
