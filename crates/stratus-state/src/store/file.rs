//! File-based state store
//!
//! Layout: `<dir>/<env>/<project>/outputs.json` and `rendered.json`.
//! Only the latest rendered revision is kept.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stratus_core::{RenderedStack, StackId, StackKind, StackOutputs, validate_environment};
use tracing::{debug, warn};

use super::{StackRecord, StateStore, next_revision};
use crate::error::{Result, StateError};

const OUTPUTS_FILE: &str = "outputs.json";
const RENDERED_FILE: &str = "rendered.json";

/// File-based state store
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating it if needed
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// State directory of a stack, never outside `base_dir`
    fn stack_dir(&self, stack: &StackId) -> Result<PathBuf> {
        validate_environment(&stack.environment)?;
        Ok(self
            .base_dir
            .join(&stack.environment)
            .join(stack.kind.project()))
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "state written");
        Ok(())
    }

    /// Read a JSON document, `None` when the file does not exist
    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Latest rendered revision, treating a corrupt file as missing
    async fn previous_rendered(&self, stack: &StackId) -> Result<Option<RenderedStack>> {
        let path = self.stack_dir(stack)?.join(RENDERED_FILE);
        match self.read_json(&path).await {
            Ok(previous) => Ok(previous),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable rendered state");
                Ok(None)
            }
        }
    }

    async fn subdirs(path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get_outputs(&self, stack: &StackId) -> Result<StackOutputs> {
        let path = self.stack_dir(stack)?.join(OUTPUTS_FILE);
        self.read_json(&path)
            .await?
            .ok_or_else(|| StateError::OutputsNotFound {
                stack: stack.name(),
            })
    }

    async fn put_outputs(&self, stack: &StackId, outputs: &StackOutputs) -> Result<()> {
        let path = self.stack_dir(stack)?.join(OUTPUTS_FILE);
        self.write_json(&path, outputs).await
    }

    async fn get_rendered(&self, stack: &StackId) -> Result<RenderedStack> {
        let path = self.stack_dir(stack)?.join(RENDERED_FILE);
        self.read_json(&path)
            .await?
            .ok_or_else(|| StateError::RenderedNotFound {
                stack: stack.name(),
            })
    }

    async fn put_rendered(&self, rendered: &RenderedStack) -> Result<RenderedStack> {
        let previous = self.previous_rendered(&rendered.stack).await?;
        let stored = next_revision(previous.as_ref(), rendered);
        let path = self.stack_dir(&stored.stack)?.join(RENDERED_FILE);
        self.write_json(&path, &stored).await?;
        Ok(stored)
    }

    async fn list(&self, environment: Option<&str>) -> Result<Vec<StackRecord>> {
        let environments = match environment {
            Some(env) => {
                validate_environment(env)?;
                vec![env.to_string()]
            }
            None => Self::subdirs(&self.base_dir).await?,
        };

        let mut records = Vec::new();
        for env in environments {
            if validate_environment(&env).is_err() {
                warn!(directory = %env, "ignoring directory that is not an environment");
                continue;
            }
            for project in Self::subdirs(&self.base_dir.join(&env)).await? {
                let Some(kind) = StackKind::ALL.into_iter().find(|k| k.project() == project) else {
                    warn!(environment = %env, directory = %project, "ignoring unknown stack directory");
                    continue;
                };
                let stack = StackId::new(kind, env.clone());
                let dir = self.stack_dir(&stack)?;
                let has_outputs = tokio::fs::try_exists(dir.join(OUTPUTS_FILE)).await?;
                let revision = self.previous_rendered(&stack).await?.map(|r| r.revision);
                records.push(StackRecord {
                    stack,
                    has_outputs,
                    revision,
                });
            }
        }
        records.sort_by(|a, b| {
            (&a.stack.environment, a.stack.kind).cmp(&(&b.stack.environment, b.stack.kind))
        });
        Ok(records)
    }
}
