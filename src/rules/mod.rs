//! Rule Engine (C5) — priority-ordered condition/action evaluation over a
//! four-namespace context.

pub mod engine;
pub mod types;

pub use engine::{ExecutionResult, RuleEngine, RuleResult};
pub use types::{Action, Condition, Context, Operator, Rule, RuleError, RuleSet};
