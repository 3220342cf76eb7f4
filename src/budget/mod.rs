//! Budget Manager (C3) — quota bookkeeping over rolling time windows,
//! with per-(type, scope) usage tracking and violation emission.

pub mod manager;
pub mod policy;
pub mod types;

pub use manager::{BudgetManager, BudgetRequest, BudgetResponse};
pub use policy::{BudgetPolicyEnforcer, BudgetPolicyRule, EnforcementAction, EnforcementDecision};
pub use types::{
    Budget, BudgetError, BudgetScope, BudgetType, BudgetUsage, TimeWindow, Violation,
    ViolationSeverity,
};
