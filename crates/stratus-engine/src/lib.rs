//! Stratus Engine - Resource graph builder for the five infrastructure stacks
//!
//! This crate turns a typed stack configuration plus the resolved outputs of
//! upstream stacks into a validated resource graph:
//! - Components declaring network, cluster, database, services and app resources
//! - Deferred attribute references and dependency edges between declarations
//! - Execution plans grouping resources into apply waves
//! - Human-readable reference errors with suggestions

pub mod components;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod kube;
pub mod plan;
pub mod policy;
pub mod stacks;
pub mod suggestions;

pub use context::StackContext;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use graph::{ResourceGraph, ResourceHandle, ResourceSpec};
pub use plan::{ExecutionPlan, ExecutionPlanSummary, PlannedResource, Wave};
