//! `Warden` CLI
//!
//! Inspect permission policies: evaluate an action against the resolved
//! settings, or print one of the canned presets.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use warden_core::Settings;
use warden_core::config::{load_settings, load_settings_from};
use warden_core::permissions::{ActionContext, PermissionKind, Preset, evaluate};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about = "Warden - permission policy evaluation for agent actions")]
struct Args {
    /// Log level filter (e.g. "info", "debug", "warn"). Overrides settings.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    /// Read this settings file instead of the global/project hierarchy.
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Project directory holding `.warden/permissions.json`.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one action and print the result as JSON.
    Eval {
        /// Permission type (edit, bash, skill, mcp, webfetch,
        /// `external_directory`, `doom_loop`).
        #[arg(long = "type")]
        kind: PermissionKind,

        /// Candidate pattern; repeat for several.
        #[arg(long)]
        pattern: Vec<String>,

        /// Agent whose overrides are layered on top.
        #[arg(long)]
        agent: Option<String>,
    },

    /// Print a canned policy (allow-all, deny-all, ask-all, read-only).
    Preset {
        name: Preset,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = resolve_settings(args.config.as_deref(), args.project.as_deref())?;
    warden_core::tracing_init::init_tracing(
        &settings.log_filter(args.log_level.as_deref()),
        args.log_json || settings.log_json(),
    );

    match args.command {
        Command::Eval {
            kind,
            pattern,
            agent,
        } => run_eval(&settings, kind, pattern, agent.as_deref()),
        Command::Preset { name } => print_json(&name.config()),
    }
}

fn resolve_settings(config: Option<&Path>, project: Option<&Path>) -> anyhow::Result<Settings> {
    if let Some(path) = config {
        return Ok(load_settings_from(path)?);
    }
    let project = match project {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    Ok(load_settings(Some(project.as_path()))?)
}

fn run_eval(
    settings: &Settings,
    kind: PermissionKind,
    patterns: Vec<String>,
    agent: Option<&str>,
) -> anyhow::Result<()> {
    let policy = settings.resolve(agent);

    let mut context = ActionContext::new(kind, "cli", "cli");
    if !patterns.is_empty() {
        context = context.with_patterns(patterns);
    }

    let result = evaluate(&policy, &context);
    info!(
        kind = %kind,
        agent = agent.unwrap_or("-"),
        rule = ?result.matched_rule,
        outcome = ?result.outcome(),
        "Evaluated action"
    );
    print_json(&result)
}

#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
