//! Policy Matcher (C6) — scores declared retry policies against a failure
//! context and selects the best match.

pub mod matcher;
pub mod types;

pub use matcher::PolicyMatcher;
pub use types::{FailureContext, Policy, PolicyCondition};
