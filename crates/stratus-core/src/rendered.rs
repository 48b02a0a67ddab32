//! Rendered stack document handed to the provisioning engine

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::output::mask_secrets;
use crate::stack::StackId;

/// How the engine treats a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Created, updated and destroyed by the engine
    Managed,
    /// Read-only lookup of something that already exists
    Lookup,
    /// Logical grouping with no cloud counterpart
    Component,
}

/// A single declaration in a rendered stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedResource {
    pub name: String,

    /// Provider type, e.g. `aws:ec2/vpc:Vpc`
    #[serde(rename = "type")]
    pub type_token: String,

    pub mode: ResourceMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Resources that must be applied first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub properties: JsonValue,

    /// Attributes the engine must treat as secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_outputs: Vec<String>,
}

/// Full resource graph of one stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedStack {
    pub stack: StackId,

    /// Incremented each time the stack is recorded
    #[serde(default)]
    pub revision: u32,

    pub rendered_at: DateTime<Utc>,

    pub resources: Vec<RenderedResource>,

    pub outputs: IndexMap<String, JsonValue>,
}

impl RenderedStack {
    pub fn new(stack: StackId) -> Self {
        Self {
            stack,
            revision: 0,
            rendered_at: Utc::now(),
            resources: Vec::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn resource(&self, name: &str) -> Option<&RenderedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Resources of a provider type
    pub fn resources_of_type<'a>(
        &'a self,
        type_token: &'a str,
    ) -> impl Iterator<Item = &'a RenderedResource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.type_token == type_token)
    }

    /// Number of resources the engine will manage
    pub fn managed_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.mode == ResourceMode::Managed)
            .count()
    }

    /// Copy with every secret replaced by a mask
    pub fn masked(&self) -> RenderedStack {
        let mut masked = self.clone();
        for resource in &mut masked.resources {
            resource.properties = mask_secrets(&resource.properties);
        }
        for value in masked.outputs.values_mut() {
            *value = mask_secrets(value);
        }
        masked
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackKind;
    use serde_json::json;

    fn sample() -> RenderedStack {
        let mut stack = RenderedStack::new(StackId::new(StackKind::Database, "demo"));
        stack.resources.push(RenderedResource {
            name: "demo-db".to_string(),
            type_token: "stratus:components:Database".to_string(),
            mode: ResourceMode::Component,
            parent: None,
            depends_on: vec![],
            properties: JsonValue::Null,
            secret_outputs: vec![],
        });
        stack.resources.push(RenderedResource {
            name: "demo-db-db-cluster".to_string(),
            type_token: "aws:rds/cluster:Cluster".to_string(),
            mode: ResourceMode::Managed,
            parent: Some("demo-db".to_string()),
            depends_on: vec!["demo-db-db-mysql-password".to_string()],
            properties: json!({
                "masterUsername": "root",
                "masterPassword": {"$secret": {"$ref": "demo-db-db-mysql-password.result"}}
            }),
            secret_outputs: vec![],
        });
        stack
            .outputs
            .insert("db_admin_password".to_string(), json!({"$secret": {"$ref": "x.result"}}));
        stack
    }

    #[test]
    fn test_masked_hides_secrets() {
        let masked = sample().masked();
        let cluster = masked.resource("demo-db-db-cluster").unwrap();
        assert_eq!(cluster.properties["masterPassword"], "[secret]");
        assert_eq!(cluster.properties["masterUsername"], "root");
        assert_eq!(masked.outputs["db_admin_password"], "[secret]");
    }

    #[test]
    fn test_managed_count_skips_components() {
        assert_eq!(sample().managed_count(), 1);
    }

    #[test]
    fn test_yaml_uses_type_key() {
        let yaml = sample().to_yaml().unwrap();
        assert!(yaml.contains("type: aws:rds/cluster:Cluster"));
        assert!(yaml.contains("mode: component"));
        let back: RenderedStack = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.resources.len(), 2);
    }
}
