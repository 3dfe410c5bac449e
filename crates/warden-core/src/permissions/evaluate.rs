//! Policy evaluation.
//!
//! Maps an [`ActionContext`] onto the verdict configured for its kind.

use std::collections::BTreeMap;

use tracing::debug;

use super::types::{ActionContext, EvaluationResult, PermissionConfig, Rule, Verdict};
use super::wildcard;

/// Reason attached to hard denies coming from policy.
pub const DENIED_BY_CONFIG: &str = "denied by configuration";

/// Reason attached to allows for kinds without any rule.
pub const NO_RULE_CONFIGURED: &str = "no rule configured";

/// Reason attached to allows when a pattern map has no match and no `"*"`.
pub const NO_PATTERN_MATCHED: &str = "no pattern matched";

/// Evaluate `context` against `config`.
///
/// A kind with no configured rule is allowed.
pub fn evaluate(config: &PermissionConfig, context: &ActionContext) -> EvaluationResult {
    let Some(rule) = config.rule_for(context.kind) else {
        debug!(kind = %context.kind, "No rule configured, allowing");
        return EvaluationResult::allow(None).with_reason(NO_RULE_CONFIGURED);
    };

    let result = match rule.as_ref() {
        Rule::Verdict(verdict) => EvaluationResult::from_verdict(*verdict, None),
        Rule::Patterns(patterns) => evaluate_patterns(patterns, &context.candidates()),
    };

    debug!(
        session_id = %context.session_id,
        kind = %context.kind,
        rule = ?result.matched_rule,
        outcome = ?result.outcome(),
        "Evaluated permission"
    );
    result
}

/// Resolve candidates against a pattern map.
///
/// Each candidate is tried in order; the first one that hits an explicit
/// pattern decides. Exact keys win outright, otherwise the longest matching
/// pattern wins. `"*"` is only consulted when no candidate matched.
fn evaluate_patterns(
    patterns: &BTreeMap<String, Verdict>,
    candidates: &[&str],
) -> EvaluationResult {
    if !candidates.is_empty() {
        let ranked = ranked_patterns(patterns);
        for candidate in candidates {
            if let Some((key, verdict)) = patterns.get_key_value(*candidate) {
                return EvaluationResult::from_verdict(*verdict, Some(key.clone()));
            }
            if let Some((key, verdict)) = ranked
                .iter()
                .find(|(key, _)| wildcard::matches(candidate, key))
            {
                return EvaluationResult::from_verdict(**verdict, Some((*key).clone()));
            }
        }
    }

    patterns.get("*").map_or_else(
        || EvaluationResult::allow(None).with_reason(NO_PATTERN_MATCHED),
        |verdict| EvaluationResult::from_verdict(*verdict, Some("*".to_string())),
    )
}

/// Non-`"*"` patterns, longest first. Equal lengths keep key order.
fn ranked_patterns(patterns: &BTreeMap<String, Verdict>) -> Vec<(&String, &Verdict)> {
    let mut ranked: Vec<_> = patterns.iter().filter(|(key, _)| *key != "*").collect();
    ranked.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    ranked
}
