//! CLI error types with exit code handling
//!
//! Every failure is reported through miette and mapped to an exit code so
//! scripts can tell a bad config from a stack that has not been applied.

use miette::Diagnostic;
use stratus_core::CoreError;
use stratus_engine::EngineError;
use stratus_state::StateError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(code(stratus::cli::config))]
    Core(#[from] CoreError),

    #[error(transparent)]
    #[diagnostic(code(stratus::cli::state))]
    State(#[from] StateError),

    /// Validation failed; the issues were already printed
    #[error("Validation of stack '{stack}' failed with {count} issue(s)")]
    #[diagnostic(code(stratus::cli::validation))]
    ValidationFailed { stack: String, count: usize },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(stratus::cli::io))]
    Io {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Serializing command output failed
    #[error("Failed to format output: {message}")]
    #[diagnostic(code(stratus::cli::output))]
    Output { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(err) => engine_exit_code(err),
            CliError::Core(err) => core_exit_code(err),
            CliError::State(err) => state_exit_code(err),
            CliError::ValidationFailed { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Output { .. } => exit_codes::ERROR,
        }
    }

    /// Create an IO error for a path
    pub fn io_at(err: std::io::Error, path: &std::path::Path) -> Self {
        Self::Io {
            message: format!("{}: {}", path.display(), err),
            help: None,
        }
    }
}

fn engine_exit_code(err: &EngineError) -> i32 {
    if err.is_config_error() {
        return exit_codes::VALIDATION_ERROR;
    }
    if err.is_reference_error() {
        return exit_codes::REFERENCE_ERROR;
    }
    match err {
        EngineError::Core(core) => core_exit_code(core),
        EngineError::Json(_) | EngineError::Yaml(_) => exit_codes::ERROR,
        _ => exit_codes::GRAPH_ERROR,
    }
}

fn core_exit_code(err: &CoreError) -> i32 {
    match err {
        CoreError::YamlParse(_)
        | CoreError::JsonParse(_)
        | CoreError::ValuesMerge { .. }
        | CoreError::MissingConfig { .. }
        | CoreError::InvalidConfig { .. }
        | CoreError::InvalidCidr { .. }
        | CoreError::InvalidEnvironment { .. } => exit_codes::VALIDATION_ERROR,
        CoreError::Io(_) => exit_codes::IO_ERROR,
        CoreError::UnknownStack { .. } => exit_codes::USAGE_ERROR,
        CoreError::DependencyCycle { .. } | CoreError::UnknownDependency { .. } => {
            exit_codes::GRAPH_ERROR
        }
        CoreError::Unresolved { .. } => exit_codes::REFERENCE_ERROR,
    }
}

fn state_exit_code(err: &StateError) -> i32 {
    match err {
        StateError::OutputsNotFound { .. } | StateError::UpstreamNotApplied { .. } => {
            exit_codes::REFERENCE_ERROR
        }
        StateError::InvalidOutputs { .. } | StateError::Json(_) | StateError::Yaml(_) => {
            exit_codes::VALIDATION_ERROR
        }
        StateError::Io(_) => exit_codes::IO_ERROR,
        StateError::Core(core) => core_exit_code(core),
        _ => exit_codes::ERROR,
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Output {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
