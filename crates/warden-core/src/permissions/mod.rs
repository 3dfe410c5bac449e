//! Permission policy engine.
//!
//! Resolves an action (shell command, file edit, skill, MCP tool, ...) to
//! allow, ask or deny using wildcard pattern rules. Longer patterns beat
//! shorter ones; kinds without a rule are allowed.

pub mod evaluate;
pub mod presets;
pub mod types;
pub mod wildcard;

pub use evaluate::{DENIED_BY_CONFIG, NO_PATTERN_MATCHED, NO_RULE_CONFIGURED, evaluate};
pub use presets::{Preset, allow_all, ask_all, deny_all, merge, read_only};
pub use types::{
    ActionContext, EvaluationResult, Outcome, PatternSet, PermissionConfig, PermissionKind, Rule,
    Verdict,
};
pub use wildcard::matches;
