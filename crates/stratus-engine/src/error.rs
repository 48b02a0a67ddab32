//! Engine error types

use miette::Diagnostic;
use stratus_core::{CoreError, StackKind};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(code(stratus::core))]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    #[diagnostic(code(stratus::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(stratus::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Resource '{name}' is declared twice")]
    #[diagnostic(
        code(stratus::graph::duplicate),
        help("resource names must be unique within a stack")
    )]
    DuplicateResource { name: String },

    #[error("Resource '{resource}' has unknown parent '{parent}'")]
    #[diagnostic(code(stratus::graph::parent))]
    UnknownParent { resource: String, parent: String },

    #[error("Resource '{resource}' references undeclared resource '{target}'")]
    #[diagnostic(code(stratus::graph::reference))]
    DanglingReference {
        resource: String,
        target: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("Dependency cycle between resources: {}", .path.join(" -> "))]
    #[diagnostic(code(stratus::graph::cycle))]
    ResourceCycle { path: Vec<String> },

    #[error("Failed to declare '{component}': {message}")]
    #[diagnostic(code(stratus::component))]
    Declaration { component: String, message: String },

    #[error("Stack '{stack}' has no output '{key}'")]
    #[diagnostic(code(stratus::reference::missing_output))]
    MissingOutput {
        stack: String,
        key: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("Outputs of stack '{stack}' are not available")]
    #[diagnostic(
        code(stratus::reference::upstream),
        help("apply the upstream stack first, or import its outputs with `stratus outputs import`")
    )]
    UpstreamMissing { stack: String },

    #[error("Stack '{stack}' reads outputs of '{dependency}' which it does not depend on")]
    #[diagnostic(code(stratus::reference::undeclared))]
    UndeclaredDependency { stack: String, dependency: String },

    #[error("Config for stack '{found}' cannot be used to render stack '{expected}'")]
    #[diagnostic(code(stratus::config::mismatch))]
    ConfigMismatch { expected: StackKind, found: StackKind },

    #[error("Stack '{stack}' does not export required output '{key}'")]
    #[diagnostic(code(stratus::graph::export))]
    MissingExport { stack: String, key: String },
}

impl EngineError {
    /// Whether the error comes from a cross-stack reference
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            Self::MissingOutput { .. } | Self::UpstreamMissing { .. } | Self::UndeclaredDependency { .. }
        )
    }

    /// Whether the error comes from configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigMismatch { .. }
                | Self::Declaration { .. }
                | Self::Core(CoreError::InvalidConfig { .. })
                | Self::Core(CoreError::InvalidCidr { .. })
                | Self::Core(CoreError::MissingConfig { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
