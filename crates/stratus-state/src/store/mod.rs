//! State stores for resolved outputs and rendered revisions
//!
//! Stratus supports two backends:
//! - **File**: one directory per environment and stack (`<dir>/<env>/<project>/`)
//! - **Memory**: for tests and dry runs

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, OperationCounts};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stratus_core::{RenderedStack, StackId, StackKind, StackOutputs};
use tracing::debug;

use crate::error::{Result, StateError};

/// What is recorded for one stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRecord {
    pub stack: StackId,
    pub has_outputs: bool,
    /// Latest rendered revision
    pub revision: Option<u32>,
}

/// Storage backend for stack state
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Resolved outputs of an applied stack
    async fn get_outputs(&self, stack: &StackId) -> Result<StackOutputs>;

    /// Record the outputs of an applied stack, replacing previous ones
    async fn put_outputs(&self, stack: &StackId, outputs: &StackOutputs) -> Result<()>;

    /// Latest rendered revision
    async fn get_rendered(&self, stack: &StackId) -> Result<RenderedStack>;

    /// Record a rendered stack as the next revision and return the stored copy
    async fn put_rendered(&self, rendered: &RenderedStack) -> Result<RenderedStack>;

    /// Every recorded stack, optionally restricted to one environment
    async fn list(&self, environment: Option<&str>) -> Result<Vec<StackRecord>>;

    /// Check if outputs are recorded for a stack
    async fn has_outputs(&self, stack: &StackId) -> Result<bool> {
        match self.get_outputs(stack).await {
            Ok(_) => Ok(true),
            Err(StateError::OutputsNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Next revision to record after `previous`
pub(crate) fn next_revision(previous: Option<&RenderedStack>, rendered: &RenderedStack) -> RenderedStack {
    let mut stored = rendered.clone();
    stored.revision = previous.map(|p| p.revision + 1).unwrap_or(1);
    stored
}

/// Outputs of every stack `stack` depends on
///
/// Fails on the first dependency, in stack order, that has not been applied.
pub async fn load_upstream(
    store: &dyn StateStore,
    stack: &StackId,
) -> Result<IndexMap<StackKind, StackOutputs>> {
    let mut upstream = IndexMap::new();
    for dependency in stack.dependencies() {
        match store.get_outputs(&dependency).await {
            Ok(outputs) => {
                debug!(stack = %stack, dependency = %dependency, outputs = outputs.len(), "upstream outputs found");
                upstream.insert(dependency.kind, outputs);
            }
            Err(StateError::OutputsNotFound { .. }) => {
                return Err(StateError::UpstreamNotApplied {
                    stack: stack.name(),
                    dependency: dependency.name(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(upstream)
}
