//! Resolution context for evaluating one stack
//!
//! Upstream outputs are injected when the context is built instead of being
//! fetched while components are declared, so a missing upstream stack fails
//! before any resource exists.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use stratus_core::{Output, StackId, StackKind, StackOutputs};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::suggestions::suggest_key;

/// Tag applied to every taggable resource
pub const ENVIRONMENT_TAG: &str = "Environment";

/// Everything a stack function may read besides its own config
#[derive(Debug, Clone)]
pub struct StackContext {
    stack: StackId,
    upstream: IndexMap<StackKind, StackOutputs>,
}

impl StackContext {
    /// Context for `stack`, given the resolved outputs of its dependencies
    ///
    /// Outputs of stacks that are not dependencies are ignored.
    pub fn new(stack: StackId, mut upstream: IndexMap<StackKind, StackOutputs>) -> Result<Self> {
        let mut resolved = IndexMap::new();
        for dependency in stack.dependencies() {
            match upstream.shift_remove(&dependency.kind) {
                Some(outputs) => {
                    debug!(stack = %stack, upstream = %dependency, outputs = outputs.len(), "upstream outputs loaded");
                    resolved.insert(dependency.kind, outputs);
                }
                None => {
                    return Err(EngineError::UpstreamMissing {
                        stack: dependency.name(),
                    });
                }
            }
        }

        Ok(Self {
            stack,
            upstream: resolved,
        })
    }

    /// Context for a stack without dependencies
    pub fn standalone(stack: StackId) -> Result<Self> {
        Self::new(stack, IndexMap::new())
    }

    pub fn stack(&self) -> &StackId {
        &self.stack
    }

    pub fn environment(&self) -> &str {
        &self.stack.environment
    }

    /// Base name of every resource of the stack, e.g. `demo-vpc`
    pub fn name(&self) -> String {
        self.stack.name()
    }

    /// Tags applied to every taggable resource
    pub fn base_tags(&self) -> IndexMap<String, String> {
        IndexMap::from([(ENVIRONMENT_TAG.to_string(), self.stack.environment.clone())])
    }

    /// Read an output of an upstream stack
    ///
    /// The output is known (it comes from an applied stack) and stays secret
    /// when the upstream stack stored it as one.
    pub fn require_output<T: DeserializeOwned>(&self, kind: StackKind, key: &str) -> Result<Output<T>> {
        let dependency = StackId::new(kind, self.stack.environment.clone());
        let Some(outputs) = self.upstream.get(&kind) else {
            return Err(EngineError::UndeclaredDependency {
                stack: self.stack.name(),
                dependency: dependency.name(),
            });
        };

        match outputs.get::<T>(key) {
            Some(value) => Ok(value?),
            None => {
                let available: Vec<&str> = outputs.keys().collect();
                Err(EngineError::MissingOutput {
                    stack: dependency.reference(),
                    key: key.to_string(),
                    suggestion: suggest_key(key, &available),
                })
            }
        }
    }
}
