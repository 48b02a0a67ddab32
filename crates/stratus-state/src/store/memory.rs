//! In-memory state store
//!
//! Useful for unit tests and for embedding the engine without a state directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stratus_core::{RenderedStack, StackId, StackOutputs};
use tokio::sync::RwLock;

use super::{StackRecord, StateStore, next_revision};
use crate::error::{Result, StateError};

#[derive(Default)]
struct Entries {
    outputs: HashMap<StackId, StackOutputs>,
    rendered: HashMap<StackId, RenderedStack>,
}

/// In-memory state store
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<Entries>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub puts: usize,
    pub lists: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated outputs
    pub async fn with_outputs(outputs: Vec<(StackId, StackOutputs)>) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.write().await;
            entries.outputs.extend(outputs);
        }
        store
    }

    /// Get operation counts for assertions
    pub async fn operation_counts(&self) -> OperationCounts {
        self.operations.read().await.clone()
    }

    pub async fn reset_counts(&self) {
        *self.operations.write().await = OperationCounts::default();
    }

    async fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut *self.operations.write().await);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_outputs(&self, stack: &StackId) -> Result<StackOutputs> {
        self.count(|ops| ops.gets += 1).await;
        self.entries
            .read()
            .await
            .outputs
            .get(stack)
            .cloned()
            .ok_or_else(|| StateError::OutputsNotFound {
                stack: stack.name(),
            })
    }

    async fn put_outputs(&self, stack: &StackId, outputs: &StackOutputs) -> Result<()> {
        self.count(|ops| ops.puts += 1).await;
        self.entries
            .write()
            .await
            .outputs
            .insert(stack.clone(), outputs.clone());
        Ok(())
    }

    async fn get_rendered(&self, stack: &StackId) -> Result<RenderedStack> {
        self.count(|ops| ops.gets += 1).await;
        self.entries
            .read()
            .await
            .rendered
            .get(stack)
            .cloned()
            .ok_or_else(|| StateError::RenderedNotFound {
                stack: stack.name(),
            })
    }

    async fn put_rendered(&self, rendered: &RenderedStack) -> Result<RenderedStack> {
        self.count(|ops| ops.puts += 1).await;
        let mut entries = self.entries.write().await;
        let stored = next_revision(entries.rendered.get(&rendered.stack), rendered);
        entries
            .rendered
            .insert(stored.stack.clone(), stored.clone());
        Ok(stored)
    }

    async fn list(&self, environment: Option<&str>) -> Result<Vec<StackRecord>> {
        self.count(|ops| ops.lists += 1).await;
        let entries = self.entries.read().await;

        let mut stacks: Vec<&StackId> = entries
            .outputs
            .keys()
            .chain(entries.rendered.keys())
            .filter(|id| environment.is_none_or(|env| id.environment == env))
            .collect();
        stacks.sort_by(|a, b| (&a.environment, a.kind).cmp(&(&b.environment, b.kind)));
        stacks.dedup();

        Ok(stacks
            .into_iter()
            .map(|id| StackRecord {
                stack: id.clone(),
                has_outputs: entries.outputs.contains_key(id),
                revision: entries.rendered.get(id).map(|r| r.revision),
            })
            .collect())
    }
}
