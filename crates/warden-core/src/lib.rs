//! `Warden` Core Library
//!
//! Shared functionality for `Warden` components:
//! - Permission policy model and wildcard rule matching
//! - Policy evaluation and canned presets
//! - Settings resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod permissions;
pub mod tracing_init;

pub use config::Settings;
pub use error::{Error, Result};
pub use permissions::{ActionContext, EvaluationResult, PermissionConfig, PermissionKind, Verdict};
