//! Secret redaction — masks sensitive values before they reach logs, DLQ
//! entries, or alert bodies.
//!
//! Pure functions over `serde_json::Value`; nothing here mutates its input.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const SENSITIVE_KEY_SUBSTRINGS: &[&str] = &[
    "authorization",
    "x-api-key",
    "password",
    "secret",
    "token",
    "key",
    "credential",
    "auth",
    "bearer",
    "jwt",
    "api_key",
    "apikey",
    "client_secret",
    "access_token",
    "refresh_token",
];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_SUBSTRINGS
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Mask a single value according to the redaction rules.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string_value(s)),
        _ => Value::String("*****".to_string()),
    }
}

fn mask_string_value(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("Bearer ") {
        let _ = rest;
        return "Bearer *****".to_string();
    }
    if let Some(rest) = s.strip_prefix("Basic ") {
        let _ = rest;
        return "Basic *****".to_string();
    }

    let len = s.chars().count();
    if len <= 4 {
        "*****".to_string()
    } else if len <= 8 {
        let first = s.chars().next().unwrap();
        let last = s.chars().last().unwrap();
        format!("{first}*****{last}")
    } else {
        let chars: Vec<char> = s.chars().collect();
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}*****{tail}")
    }
}

fn pattern_regexes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r#"(?i)(authorization:\s*bearer\s+)([^\s"']+)"#).unwrap(),
            Regex::new(r#"(?i)(password\s*=\s*)([^\s&"']+)"#).unwrap(),
            Regex::new(r#"(?i)("password"\s*:\s*")([^"]*)(")"#).unwrap(),
            Regex::new(r#"(?i)("token"\s*:\s*")([^"]*)(")"#).unwrap(),
        ]
    })
}

/// Scan a raw string for recognizable secret-bearing patterns and redact
/// the secret portion, leaving the surrounding text intact.
pub fn redact_string(input: &str) -> String {
    let mut out = input.to_string();
    for pattern in pattern_regexes() {
        out = pattern
            .replace_all(&out, |caps: &regex::Captures| {
                if caps.len() == 4 {
                    format!("{}*****{}", &caps[1], &caps[3])
                } else {
                    format!("{}*****", &caps[1])
                }
            })
            .into_owned();
    }
    out
}

/// Recursively redact a JSON value: sensitive object keys are masked via
/// [`mask_value`]; every string leaf (sensitive or not) is also scanned via
/// [`redact_string`] for embedded secret patterns.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), mask_value(v));
                } else {
                    out.insert(k.clone(), redact_json(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::String(s) => Value::String(redact_string(s)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_sensitive_keys() {
        let input = json!({"password": "hunter2", "note": "hello"});
        let out = redact_json(&input);
        assert_eq!(out["password"], json!("h*****2"));
        assert_eq!(out["note"], json!("hello"));
    }

    #[test]
    fn masks_bearer_prefix() {
        let masked = mask_value(&json!("Bearer abc123xyz"));
        assert_eq!(masked, json!("Bearer *****"));
    }

    #[test]
    fn short_values_fully_masked() {
        assert_eq!(mask_string_value("ab"), "*****");
    }

    #[test]
    fn medium_values_keep_endpoints() {
        assert_eq!(mask_string_value("abcdef"), "a*****f");
    }

    #[test]
    fn long_values_keep_two_chars_each_side() {
        assert_eq!(mask_string_value("abcdefghij"), "ab*****ij");
    }

    #[test]
    fn redacts_embedded_authorization_header() {
        let redacted = redact_string("Authorization: Bearer sk-abc123");
        assert!(redacted.contains("*****"));
        assert!(!redacted.contains("sk-abc123"));
    }

    #[test]
    fn redacts_nested_structures() {
        let input = json!({"headers": {"Authorization": "Bearer secrettoken"}, "items": ["password=hunter2"]});
        let out = redact_json(&input);
        assert_eq!(out["headers"]["Authorization"], json!("Bearer *****"));
        assert!(!out["items"][0].as_str().unwrap().contains("hunter2"));
    }
}
