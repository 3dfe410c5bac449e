//! Wildcard pattern matching for permission rules.
//!
//! A rule is matched against a candidate action identifier (a shell command
//! line, a tool name, a path). `*` is the only metacharacter.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::Regex;

/// Compiled multi-wildcard rules are cached up to this many entries.
const REGEX_CACHE_LIMIT: usize = 512;

static REGEX_CACHE: LazyLock<Mutex<HashMap<String, Option<Regex>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Check if `candidate` matches the wildcard `rule`.
///
/// Rules, first applicable wins:
/// 1. `"*"` matches everything.
/// 2. Two or more `*`: anchored regex where each `*` is `.*`.
/// 3. `"prefix*"`: prefix match.
/// 4. `"*suffix"`: suffix match.
/// 5. `"pre*post"`: prefix and suffix, without letting them overlap.
/// 6. No `*`: exact equality.
pub fn matches(candidate: &str, rule: &str) -> bool {
    if rule == "*" {
        return true;
    }

    let stars = rule.matches('*').count();
    if stars > 1 {
        return matches_regex(candidate, rule);
    }
    if stars == 0 {
        return candidate == rule;
    }

    if let Some(prefix) = rule.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    if let Some(suffix) = rule.strip_prefix('*') {
        return candidate.ends_with(suffix);
    }

    let (prefix, suffix) = rule.split_once('*').unwrap_or((rule, ""));
    candidate.len() >= prefix.len() + suffix.len()
        && candidate.starts_with(prefix)
        && candidate.ends_with(suffix)
}

/// Translate a multi-wildcard rule into an anchored regex source.
fn wildcard_to_regex(rule: &str) -> String {
    let body = rule
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}

fn matches_regex(candidate: &str, rule: &str) -> bool {
    let mut cache = REGEX_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if !cache.contains_key(rule) && cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache
        .entry(rule.to_string())
        .or_insert_with(|| Regex::new(&wildcard_to_regex(rule)).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}
