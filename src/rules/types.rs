//! Data model for rules, conditions, and the evaluation context.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{0}' has no id")]
    MissingId(String),

    #[error("rule '{0}' has no name")]
    MissingName(String),

    #[error("rule '{0}' must declare at least one condition")]
    NoConditions(String),

    #[error("rule '{0}' must declare at least one action")]
    NoActions(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("regex error evaluating condition on field '{field}': {source}")]
    Regex {
        field: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    Regex,
    In,
    NotIn,
    Exists,
    NotExists,
}

pub const KNOWN_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::Gt,
    Operator::Gte,
    Operator::Lt,
    Operator::Lte,
    Operator::Contains,
    Operator::NotContains,
    Operator::Regex,
    Operator::In,
    Operator::NotIn,
    Operator::Exists,
    Operator::NotExists,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub negate: bool,
}

/// Action kinds the engine knows how to dispatch. `transform` carries its
/// own sub-kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SetVar,
    Retry,
    HttpCall,
    Skip,
    Log,
    Route,
    Stop,
    Transform,
}

pub const KNOWN_ACTION_TYPES: &[ActionType] = &[
    ActionType::SetVar,
    ActionType::Retry,
    ActionType::HttpCall,
    ActionType::Skip,
    ActionType::Log,
    ActionType::Route,
    ActionType::Stop,
    ActionType::Transform,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub name: String,
    pub rules: Vec<Rule>,
}

/// Four-namespace lookup context the engine evaluates conditions against.
/// Lookup order on a bare field name is `variables` -> `request` ->
/// `response` -> `metadata`; first namespace containing the key wins.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub variables: HashMap<String, Value>,
    pub request: HashMap<String, Value>,
    pub response: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
}

impl Context {
    pub fn resolve(&self, field: &str) -> Option<&Value> {
        self.variables
            .get(field)
            .or_else(|| self.request.get(field))
            .or_else(|| self.response.get(field))
            .or_else(|| self.metadata.get(field))
    }
}
