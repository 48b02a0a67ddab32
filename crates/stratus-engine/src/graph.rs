//! Resource graph of a single stack
//!
//! Components declare resources into a [`ResourceGraph`]. Each declaration
//! returns a [`ResourceHandle`] whose attributes are pending [`Output`]s;
//! feeding those outputs into the properties of other declarations is what
//! creates dependency edges.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value as JsonValue;
use stratus_core::output::collect_references;
use stratus_core::{Output, RenderedResource, RenderedStack, ResourceMode, StackId};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::plan::ExecutionPlan;
use crate::suggestions::suggest_key;

/// A resource declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub name: String,
    pub type_token: String,
    pub parent: Option<String>,
    pub depends_on: Vec<String>,
    pub properties: JsonValue,
    pub secret_outputs: Vec<String>,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, type_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_token: type_token.into(),
            parent: None,
            depends_on: Vec::new(),
            properties: JsonValue::Null,
            secret_outputs: Vec::new(),
        }
    }

    /// Owning component or resource
    pub fn parent(mut self, parent: &ResourceHandle) -> Self {
        self.parent = Some(parent.name.clone());
        self
    }

    /// Explicit ordering edge for dependencies no property expresses
    pub fn depends_on(mut self, other: &ResourceHandle) -> Self {
        if !self.depends_on.contains(&other.name) {
            self.depends_on.push(other.name.clone());
        }
        self
    }

    /// Full property bag, usually built with `serde_json::json!`
    pub fn properties(mut self, properties: JsonValue) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property
    pub fn prop<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if !self.properties.is_object() {
            self.properties = JsonValue::Object(serde_json::Map::new());
        }
        if let JsonValue::Object(map) = &mut self.properties {
            map.insert(
                key.to_string(),
                serde_json::to_value(value).unwrap_or(JsonValue::Null),
            );
        }
        self
    }

    /// Attributes of the created resource that are secrets
    pub fn secret_outputs(mut self, attributes: &[&str]) -> Self {
        self.secret_outputs = attributes.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Handle to a declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHandle {
    name: String,
    type_token: String,
    secret_outputs: Vec<String>,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_token(&self) -> &str {
        &self.type_token
    }

    /// Attribute known once the engine has applied this resource
    pub fn attr<T>(&self, attribute: &str) -> Output<T> {
        let output = Output::attribute(&self.name, attribute);
        if self.secret_outputs.iter().any(|s| s == attribute) {
            output.into_secret()
        } else {
            output
        }
    }

    pub fn id(&self) -> Output<String> {
        self.attr("id")
    }

    pub fn arn(&self) -> Output<String> {
        self.attr("arn")
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    spec: ResourceSpec,
    mode: ResourceMode,
}

/// All declarations and exports of one stack
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    stack: StackId,
    resources: IndexMap<String, Declaration>,
    outputs: IndexMap<String, JsonValue>,
}

impl ResourceGraph {
    pub fn new(stack: StackId) -> Self {
        Self {
            stack,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn stack(&self) -> &StackId {
        &self.stack
    }

    /// Declare a logical grouping node
    pub fn component(
        &mut self,
        name: impl Into<String>,
        type_token: impl Into<String>,
        parent: Option<&ResourceHandle>,
    ) -> Result<ResourceHandle> {
        let mut spec = ResourceSpec::new(name, type_token);
        if let Some(parent) = parent {
            spec = spec.parent(parent);
        }
        self.insert(spec, ResourceMode::Component)
    }

    /// Declare a resource the engine manages
    pub fn declare(&mut self, spec: ResourceSpec) -> Result<ResourceHandle> {
        self.insert(spec, ResourceMode::Managed)
    }

    /// Declare a read-only lookup of something that already exists
    pub fn lookup(&mut self, spec: ResourceSpec) -> Result<ResourceHandle> {
        self.insert(spec, ResourceMode::Lookup)
    }

    fn insert(&mut self, spec: ResourceSpec, mode: ResourceMode) -> Result<ResourceHandle> {
        if self.resources.contains_key(&spec.name) {
            return Err(EngineError::DuplicateResource { name: spec.name });
        }

        debug!(resource = %spec.name, kind = %spec.type_token, ?mode, "declared");

        let handle = ResourceHandle {
            name: spec.name.clone(),
            type_token: spec.type_token.clone(),
            secret_outputs: spec.secret_outputs.clone(),
        };
        self.resources
            .insert(spec.name.clone(), Declaration { spec, mode });
        Ok(handle)
    }

    /// Publish a stack output
    pub fn export<T: Serialize>(&mut self, key: impl Into<String>, output: &Output<T>) {
        self.outputs.insert(key.into(), output.to_json());
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.get(name).map(|d| &d.spec)
    }

    pub fn mode(&self, name: &str) -> Option<ResourceMode> {
        self.resources.get(name).map(|d| d.mode)
    }

    /// Names of resources declared with the given provider type
    pub fn names_of_type(&self, type_token: &str) -> Vec<&str> {
        self.resources
            .values()
            .filter(|d| d.spec.type_token == type_token)
            .map(|d| d.spec.name.as_str())
            .collect()
    }

    pub fn outputs(&self) -> &IndexMap<String, JsonValue> {
        &self.outputs
    }

    /// Resources that must exist before `name` can be applied
    ///
    /// Attribute references, explicit `depends_on` edges and a non-component
    /// parent all count.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let Some(decl) = self.resources.get(name) else {
            return Vec::new();
        };

        let mut deps: IndexSet<String> = IndexSet::new();
        if let Some(parent) = &decl.spec.parent {
            if self.mode(parent).is_some_and(|m| m != ResourceMode::Component) {
                deps.insert(parent.clone());
            }
        }
        deps.extend(decl.spec.depends_on.iter().cloned());
        deps.extend(
            collect_references(&decl.spec.properties)
                .into_iter()
                .map(|r| r.resource),
        );
        deps.into_iter().collect()
    }

    /// Check parents, references and ordering
    pub fn validate(&self) -> Result<()> {
        let names: Vec<&str> = self.resources.keys().map(String::as_str).collect();

        for decl in self.resources.values() {
            if let Some(parent) = &decl.spec.parent {
                if !self.contains(parent) {
                    return Err(EngineError::UnknownParent {
                        resource: decl.spec.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            for dep in self.dependencies(&decl.spec.name) {
                if !self.contains(&dep) {
                    return Err(EngineError::DanglingReference {
                        resource: decl.spec.name.clone(),
                        target: dep.clone(),
                        suggestion: suggest_key(&dep, &names),
                    });
                }
            }
        }

        for (key, value) in &self.outputs {
            for reference in collect_references(value) {
                if !self.contains(&reference.resource) {
                    return Err(EngineError::DanglingReference {
                        resource: format!("output {key}"),
                        target: reference.resource.clone(),
                        suggestion: suggest_key(&reference.resource, &names),
                    });
                }
            }
        }

        ExecutionPlan::from_rendered(&self.to_rendered()).map(|_| ())
    }

    /// Validate and produce the execution plan
    pub fn plan(&self) -> Result<ExecutionPlan> {
        self.validate()?;
        ExecutionPlan::from_rendered(&self.to_rendered())
    }

    /// Validate and produce the document for the provisioning engine
    pub fn render(&self) -> Result<RenderedStack> {
        self.validate()?;
        Ok(self.to_rendered())
    }

    fn to_rendered(&self) -> RenderedStack {
        let mut rendered = RenderedStack::new(self.stack.clone());
        rendered.resources = self
            .resources
            .values()
            .map(|decl| RenderedResource {
                name: decl.spec.name.clone(),
                type_token: decl.spec.type_token.clone(),
                mode: decl.mode,
                parent: decl.spec.parent.clone(),
                depends_on: self.dependencies(&decl.spec.name),
                properties: decl.spec.properties.clone(),
                secret_outputs: decl.spec.secret_outputs.clone(),
            })
            .collect();
        rendered.outputs = self.outputs.clone();
        rendered
    }
}
