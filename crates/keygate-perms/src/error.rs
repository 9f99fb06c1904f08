//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur while building grant configurations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// A grant list entry is not a valid principal.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] keygate_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
