//! Additive scoring of policies against a failure context (§4.6).

use super::types::{FailureContext, Policy};

const SCORE_ERROR_TYPE: u32 = 10;
const SCORE_HTTP_STATUS: u32 = 8;
const SCORE_ACTION_TYPE: u32 = 6;
const SCORE_ERROR_MESSAGE_REGEX: u32 = 5;

pub struct PolicyMatcher;

impl PolicyMatcher {
    fn score(policy: &Policy, ctx: &FailureContext) -> u32 {
        let mut score = 0;
        let c = &policy.conditions;

        if let (Some(want), Some(got)) = (&c.error_type, &ctx.error_type) {
            if want == got {
                score += SCORE_ERROR_TYPE;
            }
        }
        if let (Some(want), Some(got)) = (c.http_status, ctx.http_status) {
            if want == got {
                score += SCORE_HTTP_STATUS;
            }
        }
        if let (Some(want), Some(got)) = (&c.action_type, &ctx.action_type) {
            if want == got {
                score += SCORE_ACTION_TYPE;
            }
        }
        if let (Some(pattern), Some(message)) = (&c.error_message_regex, &ctx.error_message) {
            if let Ok(re) = regex::Regex::new(pattern) {
                if re.is_match(message) {
                    score += SCORE_ERROR_MESSAGE_REGEX;
                }
            }
        }

        score
    }

    /// Select the highest-scoring enabled policy; ties broken by most
    /// recently updated. Returns `None` if nothing scores above zero.
    pub fn match_policy<'a>(policies: &'a [Policy], ctx: &FailureContext) -> Option<&'a Policy> {
        policies
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (Self::score(p, ctx), p))
            .filter(|(score, _)| *score > 0)
            .max_by(|(score_a, a), (score_b, b)| {
                score_a
                    .cmp(score_b)
                    .then_with(|| a.updated_at.cmp(&b.updated_at))
            })
            .map(|(_, policy)| policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::PolicyCondition;
    use chrono::Utc;

    fn policy(id: &str, error_type: Option<&str>, http_status: Option<u16>) -> Policy {
        Policy {
            id: id.to_string(),
            name: id.to_string(),
            retry_profile: "balanced".to_string(),
            conditions: PolicyCondition {
                error_type: error_type.map(String::from),
                http_status,
                error_message_regex: None,
                action_type: None,
            },
            budget_constraints: Default::default(),
            enabled: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn picks_highest_scoring_policy() {
        let policies = vec![
            policy("p1", Some("timeout"), None),
            policy("p2", Some("timeout"), Some(503)),
        ];
        let ctx = FailureContext {
            error_type: Some("timeout".to_string()),
            http_status: Some(503),
            ..Default::default()
        };
        let matched = PolicyMatcher::match_policy(&policies, &ctx).unwrap();
        assert_eq!(matched.id, "p2");
    }

    #[test]
    fn returns_none_when_no_match() {
        let policies = vec![policy("p1", Some("timeout"), None)];
        let ctx = FailureContext {
            error_type: Some("fatal".to_string()),
            ..Default::default()
        };
        assert!(PolicyMatcher::match_policy(&policies, &ctx).is_none());
    }

    #[test]
    fn disabled_policies_are_skipped() {
        let mut p = policy("p1", Some("timeout"), None);
        p.enabled = false;
        let ctx = FailureContext {
            error_type: Some("timeout".to_string()),
            ..Default::default()
        };
        assert!(PolicyMatcher::match_policy(&[p], &ctx).is_none());
    }
}
