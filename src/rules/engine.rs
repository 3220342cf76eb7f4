//! Deterministic rule evaluation — no network or LLM calls in this module.

use serde_json::Value;

use super::types::{
    Action, ActionType, Condition, Context, Operator, Rule, RuleError, RuleSet, KNOWN_ACTION_TYPES,
    KNOWN_OPERATORS,
};

#[derive(Debug, Clone)]
pub struct RuleResult {
    pub rule_id: String,
    pub matched: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub action_type: ActionType,
    pub applied: bool,
    pub detail: String,
}

/// Stateless evaluator over a [`Context`].
pub struct RuleEngine;

impl RuleEngine {
    pub fn validate_rule(rule: &Rule) -> Result<(), RuleError> {
        if rule.id.trim().is_empty() {
            return Err(RuleError::MissingId(rule.name.clone()));
        }
        if rule.name.trim().is_empty() {
            return Err(RuleError::MissingName(rule.id.clone()));
        }
        if rule.conditions.is_empty() {
            return Err(RuleError::NoConditions(rule.id.clone()));
        }
        if rule.actions.is_empty() {
            return Err(RuleError::NoActions(rule.id.clone()));
        }
        for condition in &rule.conditions {
            if !KNOWN_OPERATORS.contains(&condition.operator) {
                return Err(RuleError::UnknownOperator(format!("{:?}", condition.operator)));
            }
        }
        for action in &rule.actions {
            if !KNOWN_ACTION_TYPES.contains(&action.action_type) {
                return Err(RuleError::UnknownActionType(format!("{:?}", action.action_type)));
            }
        }
        Ok(())
    }

    pub fn validate_rule_set(set: &RuleSet) -> Result<(), RuleError> {
        let mut seen = std::collections::HashSet::new();
        for rule in &set.rules {
            Self::validate_rule(rule)?;
            if !seen.insert(rule.id.clone()) {
                return Err(RuleError::DuplicateId(rule.id.clone()));
            }
        }
        Ok(())
    }

    /// Evaluate every condition of `rule` against `ctx` under conjunction.
    pub fn evaluate(rule: &Rule, ctx: &Context) -> RuleResult {
        if !rule.enabled {
            return RuleResult {
                rule_id: rule.id.clone(),
                matched: false,
                error: None,
            };
        }

        for condition in &rule.conditions {
            match eval_condition(condition, ctx) {
                Ok(result) => {
                    if !result {
                        return RuleResult {
                            rule_id: rule.id.clone(),
                            matched: false,
                            error: None,
                        };
                    }
                }
                Err(e) => {
                    return RuleResult {
                        rule_id: rule.id.clone(),
                        matched: false,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        RuleResult {
            rule_id: rule.id.clone(),
            matched: true,
            error: None,
        }
    }

    /// Execute a rule's actions against `ctx`, mutating `ctx.variables` for
    /// `set_var` and returning a record of what happened for every action.
    pub fn execute(actions: &[Action], ctx: &mut Context) -> Vec<ExecutionResult> {
        actions.iter().map(|action| execute_action(action, ctx)).collect()
    }

    /// Evaluate every enabled rule in `set`, sorted by descending priority
    /// (stable for ties), executing actions for every matched rule.
    pub fn run(set: &RuleSet, ctx: &mut Context) -> Vec<RuleResult> {
        let mut rules: Vec<&Rule> = set.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut results = Vec::with_capacity(rules.len());
        for rule in rules {
            let result = Self::evaluate(rule, ctx);
            if result.matched {
                Self::execute(&rule.actions, ctx);
            }
            results.push(result);
        }
        results
    }
}

fn eval_condition(condition: &Condition, ctx: &Context) -> Result<bool, RuleError> {
    let actual = ctx.resolve(&condition.field);

    let raw = match condition.operator {
        Operator::Exists => actual.is_some_and(|v| !v.is_null()),
        Operator::NotExists => !actual.is_some_and(|v| !v.is_null()),
        Operator::Contains | Operator::NotContains => {
            let contains = match actual {
                Some(Value::String(s)) => condition
                    .value
                    .as_str()
                    .map(|needle| s.contains(needle))
                    .unwrap_or(false),
                Some(Value::Array(items)) => items.contains(&condition.value),
                _ => false,
            };
            if condition.operator == Operator::Contains {
                contains
            } else {
                !contains
            }
        }
        Operator::In | Operator::NotIn => {
            let is_in = match &condition.value {
                Value::Array(items) => actual.map(|v| items.contains(v)).unwrap_or(false),
                single => actual.map(|v| v == single).unwrap_or(false),
            };
            if condition.operator == Operator::In {
                is_in
            } else {
                !is_in
            }
        }
        Operator::Regex => {
            let pattern = condition.value.as_str().unwrap_or_default();
            let re = regex::Regex::new(pattern).map_err(|source| RuleError::Regex {
                field: condition.field.clone(),
                source,
            })?;
            actual
                .and_then(Value::as_str)
                .map(|s| re.is_match(s))
                .unwrap_or(false)
        }
        Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            compare(actual, &condition.value, condition.operator)
        }
    };

    Ok(if condition.negate { !raw } else { raw })
}

fn compare(actual: Option<&Value>, expected: &Value, op: Operator) -> bool {
    let Some(actual) = actual else {
        return op == Operator::Ne;
    };

    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return match op {
            Operator::Eq => a == b,
            Operator::Ne => a != b,
            Operator::Gt => a > b,
            Operator::Gte => a >= b,
            Operator::Lt => a < b,
            Operator::Lte => a <= b,
            _ => false,
        };
    }

    if let (Some(a), Some(b)) = (actual.as_str(), expected.as_str()) {
        return match op {
            Operator::Eq => a == b,
            Operator::Ne => a != b,
            Operator::Gt => a > b,
            Operator::Gte => a >= b,
            Operator::Lt => a < b,
            Operator::Lte => a <= b,
            _ => false,
        };
    }

    let a = actual.to_string();
    let b = expected.to_string();
    match op {
        Operator::Eq => a == b,
        Operator::Ne => a != b,
        _ => false,
    }
}

fn execute_action(action: &Action, ctx: &mut Context) -> ExecutionResult {
    match action.action_type {
        ActionType::SetVar => {
            let name = action.params.get("name").and_then(Value::as_str);
            let value = action.params.get("value").cloned().unwrap_or(Value::Null);
            if let Some(name) = name {
                ctx.variables.insert(name.to_string(), value);
                ExecutionResult {
                    action_type: action.action_type,
                    applied: true,
                    detail: format!("set variable '{name}'"),
                }
            } else {
                ExecutionResult {
                    action_type: action.action_type,
                    applied: false,
                    detail: "set_var missing 'name' param".to_string(),
                }
            }
        }
        ActionType::Log => ExecutionResult {
            action_type: action.action_type,
            applied: true,
            detail: "log emitted".to_string(),
        },
        ActionType::Transform => {
            let kind = action.params.get("kind").and_then(Value::as_str).unwrap_or("");
            ExecutionResult {
                action_type: action.action_type,
                applied: matches!(kind, "uppercase" | "lowercase" | "json_parse" | "json_stringify"),
                detail: format!("transform:{kind}"),
            }
        }
        ActionType::Retry | ActionType::HttpCall | ActionType::Skip | ActionType::Route | ActionType::Stop => {
            // These are directives interpreted by the surrounding executor;
            // the rule engine only records that they fired.
            ExecutionResult {
                action_type: action.action_type,
                applied: true,
                detail: format!("directive:{:?}", action.action_type),
            }
        }
    }
}
