//! Stratus Core - Core types for the stratus infrastructure graph compiler
//!
//! This crate provides the foundational types used throughout stratus:
//! - `Values`: Layered configuration with deep merge and `--set` overrides
//! - `StackConfig`: Typed, eagerly validated per-stack configuration
//! - `Output`: Values that may only be known once the engine applies a resource
//! - `StackKind` / `StackGraph`: The five stacks and their apply order
//! - `RenderedStack`: The document handed to the provisioning engine

pub mod cidr;
pub mod config;
pub mod error;
pub mod output;
pub mod rendered;
pub mod stack;
pub mod values;

pub use cidr::Ipv4Cidr;
pub use config::{
    AppConfig, ClusterConfig, DatabaseConfig, DbCredentials, FlowLogTraffic, Hostname,
    NetworkConfig, ServicesConfig, StackConfig,
};
pub use error::{CoreError, ValidationIssue};
pub use output::{AttrRef, Expr, Function, Output, StackOutputs, lit, mask_secrets};
pub use rendered::{RenderedResource, RenderedStack, ResourceMode};
pub use stack::{DEFAULT_ENVIRONMENT, StackGraph, StackId, StackKind, validate_environment};
pub use values::{Values, parse_set_values};
