//! Error types for stratus-state

use stratus_core::CoreError;
use thiserror::Error;

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while reading or writing stack state
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    /// No outputs recorded for a stack
    #[error("no outputs recorded for stack '{stack}'")]
    OutputsNotFound { stack: String },

    /// No rendered revision recorded for a stack
    #[error("stack '{stack}' has never been rendered")]
    RenderedNotFound { stack: String },

    /// An upstream stack has not been applied yet
    #[error("stack '{stack}' needs outputs of '{dependency}', which has not been applied\nHint: apply '{dependency}' first or run `stratus outputs import`")]
    UpstreamNotApplied { stack: String, dependency: String },

    /// Imported outputs are not a key/value document
    #[error("invalid outputs for stack '{stack}': {reason}")]
    InvalidOutputs { stack: String, reason: String },

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StateError {
    /// Whether the error means a stack has no recorded state
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OutputsNotFound { .. } | Self::RenderedNotFound { .. }
        )
    }
}
