//! Diff engine for comparing rendered revisions of a stack
//!
//! Resources are matched by name and compared as masked YAML, so secret
//! values never appear in a diff.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use similar::{ChangeTag, TextDiff};
use stratus_core::{RenderedResource, RenderedStack, mask_secrets};

use crate::error::{Result, StateError};

/// Diff engine for rendered revisions
pub struct DiffEngine {
    /// Context lines kept around each change
    pub context_lines: usize,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self { context_lines: 3 }
    }

    /// Set the number of context lines
    pub fn with_context(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Compare two rendered revisions of the same stack
    pub fn diff_rendered(&self, old: &RenderedStack, new: &RenderedStack) -> Result<DiffResult> {
        let old_resources = resource_documents(old)?;
        let new_resources = resource_documents(new)?;

        let mut changes = Vec::new();

        for (name, (type_token, new_content)) in &new_resources {
            match old_resources.get(name) {
                Some((_, old_content)) if old_content != new_content => {
                    changes.push(ResourceChange {
                        name: name.clone(),
                        type_token: type_token.clone(),
                        change_type: ChangeType::Modified,
                        diff: Some(self.compute_text_diff(old_content, new_content)),
                    });
                }
                None => {
                    changes.push(ResourceChange {
                        name: name.clone(),
                        type_token: type_token.clone(),
                        change_type: ChangeType::Added,
                        diff: Some(DiffContent::new_addition(new_content)),
                    });
                }
                _ => {}
            }
        }

        for (name, (type_token, old_content)) in &old_resources {
            if !new_resources.contains_key(name) {
                changes.push(ResourceChange {
                    name: name.clone(),
                    type_token: type_token.clone(),
                    change_type: ChangeType::Removed,
                    diff: Some(DiffContent::new_removal(old_content)),
                });
            }
        }

        Ok(DiffResult {
            old_revision: old.revision,
            new_revision: new.revision,
            changes,
            output_changes: diff_outputs(&old.outputs, &new.outputs),
        })
    }

    /// Compute a text diff between two strings
    fn compute_text_diff(&self, old: &str, new: &str) -> DiffContent {
        let diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();

        for group in diff.grouped_ops(self.context_lines) {
            for op in group {
                for change in diff.iter_changes(&op) {
                    let line_type = match change.tag() {
                        ChangeTag::Delete => LineType::Removed,
                        ChangeTag::Insert => LineType::Added,
                        ChangeTag::Equal => LineType::Context,
                    };

                    lines.push(DiffLine {
                        line_type,
                        content: change.value().trim_end().to_string(),
                        old_line_no: change.old_index(),
                        new_line_no: change.new_index(),
                    });
                }
            }
        }

        DiffContent { lines }
    }

    /// Generate a human-readable summary
    pub fn summary(&self, result: &DiffResult) -> String {
        let mut parts = Vec::new();

        for change_type in [ChangeType::Added, ChangeType::Modified, ChangeType::Removed] {
            let count = result.changes_by_type(change_type).len();
            if count > 0 {
                parts.push(format!("{} {}", count, change_type));
            }
        }
        if !result.output_changes.is_empty() {
            parts.push(format!("{} output(s) changed", result.output_changes.len()));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Masked YAML of every resource, keyed by name
fn resource_documents(stack: &RenderedStack) -> Result<IndexMap<String, (String, String)>> {
    stack
        .resources
        .iter()
        .map(|resource| {
            let masked = RenderedResource {
                properties: mask_secrets(&resource.properties),
                ..resource.clone()
            };
            let yaml = serde_yaml::to_string(&masked)?;
            Ok::<_, StateError>((resource.name.clone(), (resource.type_token.clone(), yaml)))
        })
        .collect()
}

fn diff_outputs(
    old: &IndexMap<String, JsonValue>,
    new: &IndexMap<String, JsonValue>,
) -> Vec<OutputChange> {
    let mut changes = Vec::new();

    for (key, value) in new {
        let value = mask_secrets(value);
        match old.get(key).map(mask_secrets) {
            Some(previous) if previous != value => changes.push(OutputChange {
                key: key.clone(),
                change_type: ChangeType::Modified,
                old: Some(previous),
                new: Some(value),
            }),
            None => changes.push(OutputChange {
                key: key.clone(),
                change_type: ChangeType::Added,
                old: None,
                new: Some(value),
            }),
            _ => {}
        }
    }

    for (key, value) in old {
        if !new.contains_key(key) {
            changes.push(OutputChange {
                key: key.clone(),
                change_type: ChangeType::Removed,
                old: Some(mask_secrets(value)),
                new: None,
            });
        }
    }

    changes
}

/// Result of comparing two rendered revisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub old_revision: u32,
    pub new_revision: u32,

    /// Resource changes, added and modified first in declaration order
    pub changes: Vec<ResourceChange>,

    pub output_changes: Vec<OutputChange>,
}

impl DiffResult {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || !self.output_changes.is_empty()
    }

    /// Get changes by type
    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&ResourceChange> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }
}

/// A change to a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub name: String,

    /// Provider type token
    #[serde(rename = "type")]
    pub type_token: String,

    pub change_type: ChangeType,

    /// Detailed diff (if available)
    pub diff: Option<DiffContent>,
}

impl ResourceChange {
    /// Get a display name for the resource
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.type_token)
    }
}

/// A change to a stack output, with secrets masked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChange {
    pub key: String,
    pub change_type: ChangeType,
    pub old: Option<JsonValue>,
    pub new: Option<JsonValue>,
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}

/// Detailed diff content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffContent {
    pub lines: Vec<DiffLine>,
}

impl DiffContent {
    /// Create a diff showing all lines as additions
    fn new_addition(content: &str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| DiffLine {
                line_type: LineType::Added,
                content: line.to_string(),
                old_line_no: None,
                new_line_no: Some(i),
            })
            .collect();

        Self { lines }
    }

    /// Create a diff showing all lines as removals
    fn new_removal(content: &str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| DiffLine {
                line_type: LineType::Removed,
                content: line.to_string(),
                old_line_no: Some(i),
                new_line_no: None,
            })
            .collect();

        Self { lines }
    }

    /// Generate a unified diff string
    pub fn to_unified_diff(&self) -> String {
        let mut output = String::new();

        for line in &self.lines {
            let prefix = match line.line_type {
                LineType::Added => "+",
                LineType::Removed => "-",
                LineType::Context => " ",
            };
            output.push_str(prefix);
            output.push_str(&line.content);
            output.push('\n');
        }

        output
    }
}

/// A single line in a diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: LineType,
    pub content: String,
    pub old_line_no: Option<usize>,
    pub new_line_no: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Added,
    Removed,
    Context,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratus_core::{ResourceMode, StackId, StackKind};

    fn resource(name: &str, properties: JsonValue) -> RenderedResource {
        RenderedResource {
            name: name.to_string(),
            type_token: "aws:ec2/subnet:Subnet".to_string(),
            mode: ResourceMode::Managed,
            parent: None,
            depends_on: Vec::new(),
            properties,
            secret_outputs: Vec::new(),
        }
    }

    fn stack(revision: u32, resources: Vec<RenderedResource>) -> RenderedStack {
        let mut stack = RenderedStack::new(StackId::new(StackKind::Network, "demo"));
        stack.revision = revision;
        stack.resources = resources;
        stack
    }

    #[test]
    fn test_no_changes() {
        let old = stack(1, vec![resource("a", json!({"cidrBlock": "10.0.0.0/20"}))]);
        let new = stack(2, vec![resource("a", json!({"cidrBlock": "10.0.0.0/20"}))]);
        let engine = DiffEngine::new();
        let result = engine.diff_rendered(&old, &new).unwrap();
        assert!(!result.has_changes());
        assert_eq!(engine.summary(&result), "No changes");
        assert_eq!(result.old_revision, 1);
        assert_eq!(result.new_revision, 2);
    }

    #[test]
    fn test_added_modified_removed() {
        let old = stack(
            1,
            vec![
                resource("a", json!({"cidrBlock": "10.0.0.0/20"})),
                resource("b", json!({})),
            ],
        );
        let new = stack(
            2,
            vec![
                resource("a", json!({"cidrBlock": "10.0.16.0/20"})),
                resource("c", json!({})),
            ],
        );
        let engine = DiffEngine::new();
        let result = engine.diff_rendered(&old, &new).unwrap();

        assert_eq!(result.changes_by_type(ChangeType::Modified)[0].name, "a");
        assert_eq!(result.changes_by_type(ChangeType::Added)[0].name, "c");
        assert_eq!(result.changes_by_type(ChangeType::Removed)[0].name, "b");
        assert_eq!(engine.summary(&result), "1 added, 1 modified, 1 removed");

        let unified = result.changes_by_type(ChangeType::Modified)[0]
            .diff
            .as_ref()
            .unwrap()
            .to_unified_diff();
        assert!(unified.contains("-  cidrBlock: 10.0.0.0/20"));
        assert!(unified.contains("+  cidrBlock: 10.0.16.0/20"));
    }

    #[test]
    fn test_secrets_never_shown() {
        let old = stack(1, vec![resource("pw", json!({"secretString": {"$secret": "old"}}))]);
        let mut new = stack(2, vec![resource("pw", json!({"secretString": {"$secret": "new"}}))]);
        new.outputs.insert("password".to_string(), json!({"$secret": "new"}));

        let result = DiffEngine::new().diff_rendered(&old, &new).unwrap();
        // Both secrets mask to the same text
        assert!(result.changes.is_empty());

        let output = &result.output_changes[0];
        assert_eq!(output.change_type, ChangeType::Added);
        assert_eq!(output.new, Some(json!("[secret]")));
    }

    #[test]
    fn test_context_lines_limited() {
        let props = |last: &str| {
            let mut map = serde_json::Map::new();
            for i in 0..20 {
                map.insert(format!("key{i:02}"), json!(i));
            }
            map.insert("zz".to_string(), json!(last));
            JsonValue::Object(map)
        };
        let old = stack(1, vec![resource("a", props("x"))]);
        let new = stack(2, vec![resource("a", props("y"))]);

        let result = DiffEngine::new()
            .with_context(1)
            .diff_rendered(&old, &new)
            .unwrap();
        let diff = result.changes[0].diff.as_ref().unwrap();
        let context = diff
            .lines
            .iter()
            .filter(|l| l.line_type == LineType::Context)
            .count();
        assert!(context <= 2);
        assert!(!diff.to_unified_diff().contains("key00"));
    }
}
