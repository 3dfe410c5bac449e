//! Canned policies and policy layering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{PermissionConfig, Rule, Verdict};

/// Shell commands `read_only()` lets through. Each entry is a prefix.
const READ_ONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "rg", "find", "pwd", "wc", "which", "tree",
    "git status", "git log", "git diff", "git show", "git branch",
];

/// Every kind set to `verdict`.
pub const fn uniform(verdict: Verdict) -> PermissionConfig {
    PermissionConfig {
        edit: Some(verdict),
        bash: Some(Rule::Verdict(verdict)),
        skill: Some(Rule::Verdict(verdict)),
        mcp: Some(Rule::Verdict(verdict)),
        webfetch: Some(verdict),
        external_directory: Some(verdict),
        doom_loop: Some(verdict),
    }
}

pub const fn allow_all() -> PermissionConfig {
    uniform(Verdict::Allow)
}

pub const fn deny_all() -> PermissionConfig {
    uniform(Verdict::Deny)
}

pub const fn ask_all() -> PermissionConfig {
    uniform(Verdict::Ask)
}

/// No edits, no mutating shell commands, no access outside the project.
pub fn read_only() -> PermissionConfig {
    let bash = READ_ONLY_COMMANDS
        .iter()
        .map(|cmd| (format!("{cmd}*"), Verdict::Allow))
        .chain(std::iter::once(("*".to_string(), Verdict::Deny)));

    PermissionConfig {
        edit: Some(Verdict::Deny),
        bash: Some(Rule::patterns(bash)),
        skill: Some(Rule::Verdict(Verdict::Ask)),
        mcp: Some(Rule::Verdict(Verdict::Ask)),
        webfetch: Some(Verdict::Allow),
        external_directory: Some(Verdict::Deny),
        doom_loop: Some(Verdict::Ask),
    }
}

/// Layer `overlay` on top of `base`.
///
/// Fields set in `overlay` win. Pattern-capable fields set on both sides are
/// unioned key by key, with `overlay` keys winning.
pub fn merge(base: &PermissionConfig, overlay: &PermissionConfig) -> PermissionConfig {
    PermissionConfig {
        edit: overlay.edit.or(base.edit),
        bash: merge_rule(base.bash.as_ref(), overlay.bash.as_ref()),
        skill: merge_rule(base.skill.as_ref(), overlay.skill.as_ref()),
        mcp: merge_rule(base.mcp.as_ref(), overlay.mcp.as_ref()),
        webfetch: overlay.webfetch.or(base.webfetch),
        external_directory: overlay.external_directory.or(base.external_directory),
        doom_loop: overlay.doom_loop.or(base.doom_loop),
    }
}

fn merge_rule(base: Option<&Rule>, overlay: Option<&Rule>) -> Option<Rule> {
    match (base, overlay) {
        (None, None) => None,
        (Some(rule), None) | (None, Some(rule)) => Some(rule.clone()),
        (Some(base), Some(overlay)) => {
            let mut merged = base.to_patterns();
            merged.extend(overlay.to_patterns());
            // A lone "*" is the same policy as a bare verdict.
            if merged.len() == 1 {
                if let Some(verdict) = merged.get("*") {
                    return Some(Rule::Verdict(*verdict));
                }
            }
            Some(Rule::Patterns(merged))
        }
    }
}

/// Named canned policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    AllowAll,
    DenyAll,
    AskAll,
    ReadOnly,
}

impl Preset {
    pub fn config(self) -> PermissionConfig {
        match self {
            Self::AllowAll => allow_all(),
            Self::DenyAll => deny_all(),
            Self::AskAll => ask_all(),
            Self::ReadOnly => read_only(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllowAll => "allow-all",
            Self::DenyAll => "deny-all",
            Self::AskAll => "ask-all",
            Self::ReadOnly => "read-only",
        })
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow-all" => Ok(Self::AllowAll),
            "deny-all" => Ok(Self::DenyAll),
            "ask-all" => Ok(Self::AskAll),
            "read-only" => Ok(Self::ReadOnly),
            other => Err(format!(
                "unknown preset '{other}' (expected allow-all, deny-all, ask-all or read-only)"
            )),
        }
    }
}
