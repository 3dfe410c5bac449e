//! Error types for `Warden` core library.

use thiserror::Error;

/// Result type alias using `Warden` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Warden` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings could not be read or resolved
    #[error("Configuration error: {0}")]
    Config(String),
}
