//! Action handlers dispatched by the Workflow Executor (§4.1).

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

use crate::config::SecurityPolicy;
use crate::security::UrlGuard;

use super::cancellation::{CancellationScope, ScopeOutcome};
use super::types::{ActionSpec, ActionStatus, ExecutionContext};

pub struct ActionOutcome {
    pub status: ActionStatus,
    pub output: HashMap<String, Value>,
    pub error: String,
}

impl ActionOutcome {
    fn ok(output: HashMap<String, Value>) -> Self {
        Self {
            status: ActionStatus::Completed,
            output,
            error: String::new(),
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            output: HashMap::new(),
            error: error.into(),
        }
    }
}

/// Shared collaborators action handlers need beyond the run's own context.
pub struct ActionDeps {
    pub http_client: reqwest::Client,
    pub security: SecurityPolicy,
}

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap())
}

fn resolve_path(path: &str, variables: &HashMap<String, Value>) -> Option<Value> {
    if let Some(key) = path.strip_prefix("payload.") {
        return variables.get("payload").and_then(|v| v.get(key)).cloned();
    }
    if let Some(key) = path.strip_prefix("variables.") {
        return variables.get(key).cloned();
    }
    variables.get(path).cloned()
}

fn value_to_interpolated_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Expand every `{{path}}` token in `text` against `variables`. Unresolved
/// paths expand to the empty string; expansion is applied once and is not
/// recursive on the substituted value.
pub fn interpolate_string(text: &str, variables: &HashMap<String, Value>) -> String {
    template_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            resolve_path(&caps[1], variables)
                .map(|v| value_to_interpolated_string(&v))
                .unwrap_or_default()
        })
        .into_owned()
}

fn interpolate_value(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_string(s, variables)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate_value(v, variables)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate_value(v, variables));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn interpolated_config(action: &ActionSpec, variables: &HashMap<String, Value>) -> HashMap<String, Value> {
    action
        .config
        .iter()
        .map(|(k, v)| (k.clone(), interpolate_value(v, variables)))
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

#[instrument(skip(ctx, deps, scope), fields(action = %action.name, action_type = %action.action_type))]
pub async fn dispatch(
    action: &ActionSpec,
    ctx: &mut ExecutionContext,
    deps: &ActionDeps,
    scope: &CancellationScope,
) -> ActionOutcome {
    let config = interpolated_config(action, &ctx.variables);

    match action.action_type.as_str() {
        "http_fetch" => http_fetch(&config, deps, scope).await,
        "set" => set_var(&config, ctx),
        "if" => if_handler(&config),
        "repeat" => repeat_handler(&config),
        "sleep" => sleep_handler(&config, scope).await,
        "print" => print_handler(action, &config, &ctx.variables),
        "parse_json" => parse_json_handler(&config, ctx),
        "call" => call_handler(&config),
        other => ActionOutcome::failed(format!("unsupported action type: {other}")),
    }
}

async fn http_fetch(config: &HashMap<String, Value>, deps: &ActionDeps, scope: &CancellationScope) -> ActionOutcome {
    let Some(url) = config.get("url").and_then(Value::as_str) else {
        return ActionOutcome::failed("http_fetch requires a 'url' string config");
    };

    let guard = UrlGuard::new(&deps.security);
    let validated = match guard.validate(url) {
        Ok(url) => url,
        Err(e) => return ActionOutcome::failed(format!("security_blocked: {e}")),
    };

    let method = config
        .get("method")
        .and_then(Value::as_str)
        .map(|m| Method::from_bytes(m.as_bytes()).unwrap_or(Method::GET))
        .unwrap_or(Method::GET);

    let timeout = config
        .get("timeout_ms")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or(deps.security.http_timeout)
        .min(deps.security.http_timeout);

    let request_url = validated.to_string();
    let request_method = method.to_string();

    let mut builder = deps
        .http_client
        .request(method, validated)
        .timeout(timeout)
        .header("User-Agent", deps.security.user_agent.clone());

    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        for (k, v) in headers {
            if let Some(v) = v.as_str() {
                builder = builder.header(k.as_str(), v);
            }
        }
    }

    if let Some(body) = config.get("body") {
        builder = match body {
            Value::String(s) => builder.body(s.clone()),
            other => builder.json(other),
        };
    }

    let outcome = scope
        .run(async move {
            let response = deps.http_client.execute(builder.build()?).await?;
            let status = response.status();
            let headers: HashMap<String, Value> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or_default().to_string())))
                .collect();
            let bytes = response.bytes().await?;
            if bytes.len() as u64 > deps.security.max_response_bytes {
                return Ok::<_, reqwest::Error>(Err(format!(
                    "response exceeded max_response_bytes ({})",
                    deps.security.max_response_bytes
                )));
            }
            let body_value = serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

            let redacted_headers = crate::secrets::redact_json(&Value::Object(headers.into_iter().collect()));

            let mut output = HashMap::new();
            output.insert("status_code".to_string(), Value::from(status.as_u16()));
            output.insert("status".to_string(), Value::String(status.to_string()));
            output.insert("headers".to_string(), redacted_headers);
            output.insert("body".to_string(), body_value);
            output.insert("url".to_string(), Value::String(request_url));
            output.insert("method".to_string(), Value::String(request_method));
            Ok(Ok(output))
        })
        .await;

    match outcome {
        Ok(Ok(Ok(output))) => ActionOutcome::ok(output),
        Ok(Ok(Err(too_large))) => ActionOutcome::failed(too_large),
        Ok(Err(e)) => ActionOutcome::failed(format!("http request failed: {e}")),
        Err(ScopeOutcome::TimedOut) => ActionOutcome::failed("action_timeout"),
        Err(ScopeOutcome::Cancelled) => ActionOutcome::failed("cancelled"),
        Err(ScopeOutcome::Completed) => unreachable!(),
    }
}

fn set_var(config: &HashMap<String, Value>, ctx: &mut ExecutionContext) -> ActionOutcome {
    let Some(variable) = config.get("variable").and_then(Value::as_str) else {
        return ActionOutcome::failed("set requires a 'variable' string config");
    };
    let value = config.get("value").cloned().unwrap_or(Value::Null);
    ctx.variables.insert(variable.to_string(), value.clone());

    let mut output = HashMap::new();
    output.insert("variable".to_string(), Value::String(variable.to_string()));
    output.insert("value".to_string(), value);
    ActionOutcome::ok(output)
}

/// Evaluates truthiness and records branch metadata; does not itself
/// execute nested actions (§9).
fn if_handler(config: &HashMap<String, Value>) -> ActionOutcome {
    let condition = config.get("condition").cloned().unwrap_or(Value::Bool(false));
    let result = truthy(&condition);
    let mut output = HashMap::new();
    output.insert("condition".to_string(), condition);
    output.insert("result".to_string(), Value::Bool(result));
    ActionOutcome::ok(output)
}

/// Records iteration configuration; does not itself execute nested
/// actions (§9).
fn repeat_handler(config: &HashMap<String, Value>) -> ActionOutcome {
    let iterations = config.get("iterations").cloned().unwrap_or(Value::Number(0.into()));
    let actions = config
        .get("actions")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let mut output = HashMap::new();
    output.insert("iterations".to_string(), iterations);
    output.insert("actions".to_string(), actions);
    ActionOutcome::ok(output)
}

async fn sleep_handler(config: &HashMap<String, Value>, scope: &CancellationScope) -> ActionOutcome {
    let Some(seconds) = config.get("seconds").and_then(Value::as_f64) else {
        return ActionOutcome::failed("sleep requires a numeric 'seconds' config");
    };
    if seconds <= 0.0 {
        return ActionOutcome::failed("sleep 'seconds' must be greater than zero");
    }

    let outcome = scope.run(tokio::time::sleep(Duration::from_secs_f64(seconds))).await;
    match outcome {
        Ok(()) => {
            let mut output = HashMap::new();
            output.insert("slept_seconds".to_string(), Value::from(seconds));
            ActionOutcome::ok(output)
        }
        Err(ScopeOutcome::TimedOut) => ActionOutcome::failed("action_timeout"),
        Err(ScopeOutcome::Cancelled) => ActionOutcome::failed("cancelled"),
        Err(ScopeOutcome::Completed) => unreachable!(),
    }
}

fn print_handler(action: &ActionSpec, config: &HashMap<String, Value>, variables: &HashMap<String, Value>) -> ActionOutcome {
    let raw_message = config.get("message").and_then(Value::as_str).unwrap_or_default();
    let message = interpolate_string(raw_message, variables);
    let data = config.get("data").cloned().unwrap_or(Value::Null);

    println!("[{}] {message}", action.name);
    tracing::info!(action = %action.name, %message, "print action");

    let mut output = HashMap::new();
    output.insert("message".to_string(), Value::String(message));
    output.insert("data".to_string(), data);
    ActionOutcome::ok(output)
}

fn parse_json_handler(config: &HashMap<String, Value>, ctx: &mut ExecutionContext) -> ActionOutcome {
    let Some(path) = config.get("jsonpath").and_then(Value::as_str) else {
        return ActionOutcome::failed("parse_json requires a 'jsonpath' string config");
    };
    let source = config.get("source").and_then(Value::as_str).unwrap_or("last_result");
    let variable = config.get("variable").and_then(Value::as_str);

    let source_value = match source {
        "last_result" => match ctx.last_completed_output() {
            Some(map) => Value::Object(map.clone().into_iter().collect()),
            None => return ActionOutcome::failed("no prior completed result to source from"),
        },
        "payload" => ctx.variables.get("payload").cloned().unwrap_or(Value::Null),
        name => match ctx.variables.get(name) {
            Some(v) => v.clone(),
            None => return ActionOutcome::failed(format!("unknown source variable '{name}'")),
        },
    };

    let results = match jsonpath_lib::select(&source_value, path) {
        Ok(results) => results,
        Err(e) => return ActionOutcome::failed(format!("jsonpath evaluation failed: {e}")),
    };

    let result_value = Value::Array(results.into_iter().cloned().collect());

    if let Some(variable) = variable {
        ctx.variables.insert(variable.to_string(), result_value.clone());
    }

    let mut output = HashMap::new();
    output.insert("jsonpath".to_string(), Value::String(path.to_string()));
    output.insert("source".to_string(), Value::String(source.to_string()));
    output.insert("variable".to_string(), variable.map(Value::from).unwrap_or(Value::Null));
    output.insert("result".to_string(), result_value);
    ActionOutcome::ok(output)
}

/// Records an intended function invocation; this core does not dispatch
/// the call itself (§4.1).
fn call_handler(config: &HashMap<String, Value>) -> ActionOutcome {
    let Some(function) = config.get("function").and_then(Value::as_str) else {
        return ActionOutcome::failed("call requires a 'function' string config");
    };
    let params = config.get("params").cloned().unwrap_or(Value::Object(Default::default()));

    let mut output = HashMap::new();
    output.insert("function".to_string(), Value::String(function.to_string()));
    output.insert("params".to_string(), params);
    ActionOutcome::ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_with_payload() -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert("payload".to_string(), serde_json::json!({"name": "world"}));
        vars.insert("msg".to_string(), Value::String("hi".to_string()));
        vars
    }

    #[test]
    fn interpolates_bare_variable() {
        let vars = vars_with_payload();
        assert_eq!(interpolate_string("{{msg}}", &vars), "hi");
    }

    #[test]
    fn interpolates_payload_path() {
        let vars = vars_with_payload();
        assert_eq!(interpolate_string("hello {{payload.name}}", &vars), "hello world");
    }

    #[test]
    fn unresolved_path_expands_to_empty() {
        let vars = vars_with_payload();
        assert_eq!(interpolate_string("{{missing}}", &vars), "");
    }

    #[test]
    fn truthy_rules() {
        assert!(truthy(&Value::Bool(true)));
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&Value::String(String::new())));
        assert!(truthy(&Value::String("x".to_string())));
        assert!(!truthy(&Value::from(0)));
        assert!(truthy(&Value::from(1)));
    }

    #[tokio::test]
    async fn set_handler_writes_variable() {
        let mut ctx = ExecutionContext::new("r1", "wf1");
        let mut config = HashMap::new();
        config.insert("variable".to_string(), Value::String("x".to_string()));
        config.insert("value".to_string(), Value::String("hi".to_string()));
        let outcome = set_var(&config, &mut ctx);
        assert_eq!(outcome.status, ActionStatus::Completed);
        assert_eq!(ctx.variables.get("x"), Some(&Value::String("hi".to_string())));
    }

    #[test]
    fn if_handler_records_metadata_without_executing() {
        let mut config = HashMap::new();
        config.insert("condition".to_string(), Value::Bool(true));
        let outcome = if_handler(&config);
        assert_eq!(outcome.output.get("result"), Some(&Value::Bool(true)));
    }
}
