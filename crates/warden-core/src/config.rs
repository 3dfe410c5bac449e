//! Settings resolution for Warden.
//!
//! Implements hierarchical settings resolution:
//! 1. Built-in defaults
//! 2. Global settings (`<config dir>/warden/permissions.json`)
//! 3. Project settings (`.warden/permissions.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::permissions::{PermissionConfig, Preset, merge};

/// Settings file name, both globally and per project.
pub const SETTINGS_FILE: &str = "permissions.json";

/// Default log level when nothing else sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Crates the log level applies to.
const LOG_TARGETS: &[&str] = &["warden_broker", "warden_core"];

/// Complete Warden settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_json: Option<bool>,
    /// Canned policy the `permission` block is layered onto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub permission: PermissionConfig,
    /// Per-agent overrides, layered last.
    #[serde(default)]
    pub agents: HashMap<String, PermissionConfig>,
}

impl Settings {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_json(&self) -> bool {
        self.log_json.unwrap_or(false)
    }

    /// Tracing filter for Warden crates; `level` (from the command line)
    /// wins over the configured level.
    pub fn log_filter(&self, level: Option<&str>) -> String {
        let level = level.unwrap_or_else(|| self.log_level());
        LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Effective policy: preset, then `permission`, then the agent override.
    pub fn resolve(&self, agent: Option<&str>) -> PermissionConfig {
        let base = self.preset.map(Preset::config).unwrap_or_default();
        let config = merge(&base, &self.permission);
        match agent.and_then(|name| self.agents.get(name)) {
            Some(overlay) => merge(&config, overlay),
            None => config,
        }
    }

    /// Layer `overlay` on top of these settings.
    pub fn merge(&mut self, overlay: Self) {
        if overlay.log_level.is_some() {
            self.log_level = overlay.log_level;
        }
        if overlay.log_json.is_some() {
            self.log_json = overlay.log_json;
        }
        if overlay.preset.is_some() {
            self.preset = overlay.preset;
        }
        self.permission = merge(&self.permission, &overlay.permission);
        for (name, agent) in overlay.agents {
            let merged = match self.agents.get(&name) {
                Some(existing) => merge(existing, &agent),
                None => agent,
            };
            self.agents.insert(name, merged);
        }
    }
}

/// Load settings with hierarchical resolution.
pub fn load_settings(project_dir: Option<&Path>) -> Result<Settings> {
    let mut settings = load_layers(global_settings_path().as_deref(), project_dir)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Load one explicit settings file, skipping the global/project hierarchy.
/// Environment overrides still apply.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let mut settings = load_settings_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Global settings path, e.g. `~/.config/warden/permissions.json` on Linux.
pub fn global_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("warden").join(SETTINGS_FILE))
}

/// Project settings path inside `dir`.
pub fn project_settings_path(dir: &Path) -> PathBuf {
    dir.join(".warden").join(SETTINGS_FILE)
}

/// Read a single settings file.
pub fn load_settings_file(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read settings file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse settings file {}: {}", path.display(), e))
    })
}

fn load_layers(global: Option<&Path>, project_dir: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(path) = global.filter(|p| p.exists()) {
        debug!(path = %path.display(), "Loading global settings");
        settings.merge(load_settings_file(path)?);
    }

    if let Some(dir) = project_dir {
        let path = project_settings_path(dir);
        if path.exists() {
            debug!(path = %path.display(), "Loading project settings");
            settings.merge(load_settings_file(&path)?);
        }
    }

    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("WARDEN_LOG_LEVEL") {
        settings.log_level = Some(val);
    }
    if let Some(val) = var("WARDEN_LOG_JSON") {
        settings.log_json = Some(matches!(val.as_str(), "1" | "true" | "yes"));
    }
    if let Some(val) = var("WARDEN_PRESET") {
        match val.parse() {
            Ok(preset) => settings.preset = Some(preset),
            Err(e) => tracing::warn!(error = %e, "Ignoring WARDEN_PRESET"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::permissions::{Rule, Verdict};

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn default_settings_are_empty_policy() {
        let settings = Settings::default();
        assert_eq!(settings.log_level(), "warn");
        assert!(!settings.log_json());
        assert_eq!(settings.resolve(None), PermissionConfig::default());
    }

    #[test]
    fn log_filter_prefers_cli_level() {
        let mut settings = Settings::default();
        assert_eq!(settings.log_filter(None), "warden_broker=warn,warden_core=warn");

        settings.log_level = Some("debug".into());
        assert_eq!(settings.log_filter(None), "warden_broker=debug,warden_core=debug");
        assert_eq!(
            settings.log_filter(Some("trace")),
            "warden_broker=trace,warden_core=trace"
        );
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.json");
        write(&path, r#"{"logJson":true,"permission":{"edit":"deny"}}"#);

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.permission.edit, Some(Verdict::Deny));

        let missing = load_settings_from(&tmp.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, Error::Config(msg) if msg.contains("Failed to read")));
    }

    #[test]
    fn project_layer_overrides_global() {
        let tmp = tempfile::tempdir().unwrap();
        let global = tmp.path().join("global").join(SETTINGS_FILE);
        write(
            &global,
            r#"{"logLevel":"debug","permission":{"bash":{"git *":"allow","*":"ask"},"edit":"ask"}}"#,
        );
        let project = tmp.path().join("project");
        write(
            &project_settings_path(&project),
            r#"{"permission":{"bash":{"rm *":"deny"},"edit":"allow"}}"#,
        );

        let settings = load_layers(Some(global.as_path()), Some(project.as_path())).unwrap();
        assert_eq!(settings.log_level(), "debug");
        assert_eq!(settings.permission.edit, Some(Verdict::Allow));
        assert_eq!(
            settings.permission.bash,
            Some(Rule::patterns([
                ("*", Verdict::Ask),
                ("git *", Verdict::Allow),
                ("rm *", Verdict::Deny),
            ]))
        );
    }

    #[test]
    fn missing_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.json");
        let settings = load_layers(Some(missing.as_path()), Some(tmp.path())).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);
        write(&path, "{ not json");
        let err = load_settings_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Failed to parse")));
    }

    #[test]
    fn resolve_layers_preset_permission_and_agent() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "preset": "read-only",
                "permission": {"webfetch": "ask"},
                "agents": {"builder": {"edit": "allow", "bash": {"cargo *": "allow"}}}
            }"#,
        )
        .unwrap();

        let base = settings.resolve(None);
        assert_eq!(base.edit, Some(Verdict::Deny));
        assert_eq!(base.webfetch, Some(Verdict::Ask));

        let builder = settings.resolve(Some("builder"));
        assert_eq!(builder.edit, Some(Verdict::Allow));
        let Some(Rule::Patterns(bash)) = builder.bash else {
            panic!("expected pattern map");
        };
        assert_eq!(bash.get("cargo *"), Some(&Verdict::Allow));
        assert_eq!(bash.get("*"), Some(&Verdict::Deny));

        assert_eq!(settings.resolve(Some("unknown")), base);
    }

    #[test]
    fn env_overrides_win() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |key| match key {
            "WARDEN_LOG_LEVEL" => Some("trace".into()),
            "WARDEN_LOG_JSON" => Some("true".into()),
            "WARDEN_PRESET" => Some("ask-all".into()),
            _ => None,
        });
        assert_eq!(settings.log_level(), "trace");
        assert!(settings.log_json());
        assert_eq!(settings.preset, Some(Preset::AskAll));
    }

    #[test]
    fn invalid_env_preset_is_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |key| {
            (key == "WARDEN_PRESET").then(|| "wide-open".to_string())
        });
        assert!(settings.preset.is_none());
    }
}
