//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },

    #[error("Missing required config key: {key}")]
    MissingConfig { key: String },

    #[error("Invalid configuration for stack '{stack}':\n{}", format_issues(.issues))]
    InvalidConfig {
        stack: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Invalid CIDR block '{input}': {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("Unknown stack '{name}' (expected one of: vpc, eks, db, services, app)")]
    UnknownStack { name: String },

    #[error("Invalid environment name '{name}': use lowercase letters, digits and '-', starting with a letter (at most 32 characters)")]
    InvalidEnvironment { name: String },

    #[error("Dependency cycle between stacks: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Stack '{stack}' depends on unknown stack '{dependency}'")]
    UnknownDependency { stack: String, dependency: String },

    #[error("Value of '{expression}' is not known until apply")]
    Unresolved { expression: String },
}

/// A single problem found while validating a stack configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted config path (e.g. `app_hostnames[1].name`)
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, CoreError>;
