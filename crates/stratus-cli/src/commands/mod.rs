//! CLI command implementations

pub mod diff;
pub mod order;
pub mod outputs;
pub mod plan;
pub mod render;
pub mod validate;

use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use stratus_core::{
    DEFAULT_ENVIRONMENT, StackConfig, StackId, StackKind, Values, validate_environment,
};
use stratus_engine::StackContext;
use stratus_state::{FileStore, load_upstream};
use tracing::debug;

use crate::error::{CliError, Result};

/// Arguments selecting a stack and its configuration
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Stack to operate on (vpc, eks, db, services, app)
    pub stack: StackKind,

    /// Environment name, used as the stack name prefix
    #[arg(
        short = 'e',
        long = "env",
        env = "STRATUS_ENV",
        default_value = DEFAULT_ENVIRONMENT,
        value_parser = parse_environment
    )]
    pub environment: String,

    /// Config file(s) to merge, in order
    #[arg(short = 'f', long = "config")]
    pub config: Vec<PathBuf>,

    /// Set config values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,
}

impl StackArgs {
    pub fn stack_id(&self) -> StackId {
        StackId::new(self.stack, self.environment.clone())
    }

    /// Merge config files and `--set` overrides
    pub fn values(&self) -> Result<Values> {
        for file in &self.config {
            if !file.exists() {
                return Err(CliError::Io {
                    message: format!("config file {} not found", file.display()),
                    help: Some("pass stack config files with -f/--config".to_string()),
                });
            }
        }
        let values = Values::layered(&self.config, &self.set)?;
        debug!(files = self.config.len(), overrides = self.set.len(), "config loaded");
        Ok(values)
    }

    /// Typed and validated stack config
    pub fn load_config(&self) -> Result<StackConfig> {
        Ok(StackConfig::from_values(self.stack, &self.values()?)?)
    }
}

/// Environment names end up in resource names and state paths
pub fn parse_environment(value: &str) -> std::result::Result<String, String> {
    validate_environment(value).map_err(|e| e.to_string())?;
    Ok(value.to_string())
}

/// Location of recorded stack state
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Directory holding stack outputs and rendered revisions
    #[arg(long, env = "STRATUS_STATE_DIR", default_value = ".stratus")]
    pub state_dir: PathBuf,
}

impl StateArgs {
    pub async fn open(&self) -> Result<FileStore> {
        FileStore::new(&self.state_dir)
            .await
            .map_err(|e| match e {
                stratus_state::StateError::Io(io) => CliError::io_at(io, &self.state_dir),
                other => other.into(),
            })
    }
}

/// Output format for documents
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn to_string_pretty<T: Serialize>(self, value: &T) -> Result<String> {
        Ok(match self {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
        })
    }
}

/// Print a serialized document, ending with exactly one newline
pub fn print_document(text: &str) {
    println!("{}", text.trim_end_matches('\n'));
}

/// Load config and upstream outputs for a stack
pub async fn prepare(stack: &StackArgs, store: &FileStore) -> Result<(StackContext, StackConfig)> {
    let config = stack.load_config()?;
    let id = stack.stack_id();
    let upstream = load_upstream(store, &id).await?;
    let ctx = StackContext::new(id, upstream)?;
    Ok((ctx, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file() {
        let args = StackArgs {
            stack: StackKind::Network,
            environment: "demo".to_string(),
            config: vec![PathBuf::from("/nonexistent/vpc.yaml")],
            set: vec![],
        };
        let err = args.values().unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::IO_ERROR);
    }

    #[test]
    fn test_set_only_config() {
        let args = StackArgs {
            stack: StackKind::Network,
            environment: "prod".to_string(),
            config: vec![],
            set: vec!["vpc_cidr=10.1.0.0/16".to_string()],
        };
        let values = args.values().unwrap();
        assert_eq!(values.get("vpc_cidr").unwrap(), "10.1.0.0/16");
        assert_eq!(args.stack_id().name(), "prod-vpc");
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!(parse_environment("staging").unwrap(), "staging");
        assert!(parse_environment("../x").is_err());
        assert!(parse_environment("").is_err());
        assert!(parse_environment("Prod").is_err());
    }

    #[test]
    fn test_output_format() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(OutputFormat::Yaml.to_string_pretty(&value).unwrap(), "a: 1\n");
        assert_eq!(
            OutputFormat::Json.to_string_pretty(&value).unwrap(),
            "{\n  \"a\": 1\n}"
        );
    }
}
