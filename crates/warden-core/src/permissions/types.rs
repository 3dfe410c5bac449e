//! Permission policy data model.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Verdict attached to a permission kind or pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Proceed without prompting.
    Allow,
    /// Ask the user.
    Ask,
    /// Refuse without prompting.
    Deny,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
            Self::Deny => "deny",
        })
    }
}

/// Rule for a pattern-capable permission kind.
///
/// Either one verdict for every invocation, or a map from wildcard pattern
/// to verdict. Keys are kept sorted so evaluation is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Verdict(Verdict),
    Patterns(BTreeMap<String, Verdict>),
}

impl Rule {
    /// Pattern map form; a bare verdict becomes `{"*": verdict}`.
    pub fn to_patterns(&self) -> BTreeMap<String, Verdict> {
        match self {
            Self::Verdict(v) => BTreeMap::from([("*".to_string(), *v)]),
            Self::Patterns(map) => map.clone(),
        }
    }

    /// Build a pattern rule from `(pattern, verdict)` pairs.
    pub fn patterns<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Verdict)>,
        S: Into<String>,
    {
        Self::Patterns(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Verdict> for Rule {
    fn from(v: Verdict) -> Self {
        Self::Verdict(v)
    }
}

/// Policy document consumed by the evaluator.
///
/// Unset fields mean "no rule configured" for that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bash: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webfetch: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_directory: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doom_loop: Option<Verdict>,
}

impl PermissionConfig {
    /// Rule configured for `kind`, if any.
    pub fn rule_for(&self, kind: PermissionKind) -> Option<Cow<'_, Rule>> {
        let verdict = |v: Option<Verdict>| v.map(|v| Cow::Owned(Rule::Verdict(v)));
        match kind {
            PermissionKind::Edit => verdict(self.edit),
            PermissionKind::Bash => self.bash.as_ref().map(Cow::Borrowed),
            PermissionKind::Skill => self.skill.as_ref().map(Cow::Borrowed),
            PermissionKind::Mcp => self.mcp.as_ref().map(Cow::Borrowed),
            PermissionKind::Webfetch => verdict(self.webfetch),
            PermissionKind::ExternalDirectory => verdict(self.external_directory),
            PermissionKind::DoomLoop => verdict(self.doom_loop),
        }
    }
}

/// Kind of action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Edit,
    Bash,
    Skill,
    Mcp,
    Webfetch,
    ExternalDirectory,
    DoomLoop,
}

impl PermissionKind {
    /// Wire name, e.g. `external_directory`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Bash => "bash",
            Self::Skill => "skill",
            Self::Mcp => "mcp",
            Self::Webfetch => "webfetch",
            Self::ExternalDirectory => "external_directory",
            Self::DoomLoop => "doom_loop",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(Self::Edit),
            "bash" => Ok(Self::Bash),
            "skill" => Ok(Self::Skill),
            "mcp" => Ok(Self::Mcp),
            "webfetch" => Ok(Self::Webfetch),
            "external_directory" => Ok(Self::ExternalDirectory),
            "doom_loop" => Ok(Self::DoomLoop),
            other => Err(format!("unknown permission type: {other}")),
        }
    }
}

/// Candidate string(s) an action is matched by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSet {
    One(String),
    Many(Vec<String>),
}

impl PatternSet {
    /// Candidates in declaration order.
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// A request to perform an action, as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    #[serde(rename = "type")]
    pub kind: PermissionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternSet>,
    pub session_id: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Patterns an "always" answer should remember. Derived from the
    /// candidates when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always: Vec<String>,
}

impl ActionContext {
    pub fn new(
        kind: PermissionKind,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            pattern: None,
            session_id: session_id.into(),
            message_id: message_id.into(),
            call_id: None,
            title: None,
            metadata: serde_json::Value::Null,
            always: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(PatternSet::One(pattern.into()));
        self
    }

    #[must_use]
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern = Some(PatternSet::Many(
            patterns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    #[must_use]
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_always<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.always = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Explicit candidates; empty when no pattern was supplied.
    pub fn candidates(&self) -> Vec<&str> {
        self.pattern
            .as_ref()
            .map(PatternSet::candidates)
            .unwrap_or_default()
    }

    /// Patterns that must all be approved for the session to cover this
    /// action: the explicit candidates, or the kind name when none were
    /// supplied.
    pub fn required_patterns(&self) -> Vec<String> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            vec![self.kind.as_str().to_string()]
        } else {
            candidates.into_iter().map(String::from).collect()
        }
    }

    /// Patterns an "always" answer adds to the session.
    ///
    /// Explicit `always` patterns win. Otherwise shell commands widen to
    /// their command head (`npm:install` becomes `npm:*`, `git push origin`
    /// becomes `git *`) and every other kind keeps its required patterns.
    pub fn approval_patterns(&self) -> Vec<String> {
        if !self.always.is_empty() {
            return self.always.clone();
        }
        let required = self.required_patterns();
        if self.kind != PermissionKind::Bash || self.pattern.is_none() {
            return required;
        }
        let mut widened: Vec<String> = Vec::with_capacity(required.len());
        for pattern in required.iter().map(|p| command_head_pattern(p)) {
            if !widened.contains(&pattern) {
                widened.push(pattern);
            }
        }
        widened
    }
}

/// `head<sep>*` for a command whose head ends at the first `:` or space;
/// the command itself when it has no arguments.
fn command_head_pattern(command: &str) -> String {
    match command.find([':', ' ']) {
        Some(end) if end > 0 => format!("{}*", &command[..=end]),
        _ => command.to_string(),
    }
}

/// Three-way view of an [`EvaluationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Ask,
    Deny,
}

/// Result of evaluating an [`ActionContext`] against a [`PermissionConfig`].
///
/// `allowed` and `requires_ask` are never both true; both false is a hard
/// deny.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub allowed: bool,
    pub requires_ask: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EvaluationResult {
    pub fn allow(matched_rule: Option<String>) -> Self {
        Self {
            allowed: true,
            requires_ask: false,
            matched_rule,
            reason: None,
        }
    }

    pub fn ask(matched_rule: Option<String>) -> Self {
        Self {
            allowed: false,
            requires_ask: true,
            matched_rule,
            reason: None,
        }
    }

    pub fn deny(matched_rule: Option<String>) -> Self {
        Self {
            allowed: false,
            requires_ask: false,
            matched_rule,
            reason: Some(super::evaluate::DENIED_BY_CONFIG.to_string()),
        }
    }

    /// Resolve a verdict into a result.
    pub fn from_verdict(verdict: Verdict, matched_rule: Option<String>) -> Self {
        match verdict {
            Verdict::Allow => Self::allow(matched_rule),
            Verdict::Ask => Self::ask(matched_rule),
            Verdict::Deny => Self::deny(matched_rule),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub const fn outcome(&self) -> Outcome {
        if self.allowed {
            Outcome::Allow
        } else if self.requires_ask {
            Outcome::Ask
        } else {
            Outcome::Deny
        }
    }
}
