//! Stacks and the order they are applied in
//!
//! Five stacks make up a deployment. Each publishes a fixed set of outputs
//! that downstream stacks read; the dependency relation between them must be
//! acyclic.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Environment used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "demo";

/// Organization owning the stack references
pub const ORGANIZATION: &str = "organization";

/// Environment name: a lowercase label. It prefixes every resource name
/// and names the environment's state directory
static ENVIRONMENT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]([-a-z0-9]{0,30}[a-z0-9])?$").expect("valid regex")
});

/// Check an environment name before it is used in names or paths
pub fn validate_environment(name: &str) -> Result<()> {
    if ENVIRONMENT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidEnvironment {
            name: name.to_string(),
        })
    }
}

/// One of the five independently applied stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StackKind {
    #[serde(rename = "vpc")]
    Network,
    #[serde(rename = "eks")]
    Cluster,
    #[serde(rename = "db")]
    Database,
    #[serde(rename = "services")]
    Services,
    #[serde(rename = "app")]
    App,
}

impl StackKind {
    pub const ALL: [StackKind; 5] = [
        StackKind::Network,
        StackKind::Cluster,
        StackKind::Database,
        StackKind::Services,
        StackKind::App,
    ];

    /// Project name, also used as the state directory name
    pub fn project(&self) -> &'static str {
        match self {
            Self::Network => "vpc",
            Self::Cluster => "eks",
            Self::Database => "db",
            Self::Services => "services",
            Self::App => "app",
        }
    }

    /// Prefix used in stack names
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Network => "vpc",
            Self::Cluster => "k",
            Self::Database => "db",
            Self::Services => "svcs",
            Self::App => "app",
        }
    }

    /// Stacks whose outputs this stack reads
    pub fn dependencies(&self) -> &'static [StackKind] {
        match self {
            Self::Network => &[],
            Self::Cluster => &[StackKind::Network],
            Self::Database => &[StackKind::Network],
            Self::Services => &[StackKind::Network, StackKind::Cluster],
            Self::App => &[StackKind::Cluster, StackKind::Database],
        }
    }

    /// Outputs every applied stack of this kind must publish
    pub fn required_outputs(&self) -> &'static [&'static str] {
        match self {
            Self::Network => &[
                "vpc_id",
                "vpc_cidr",
                "public_subnet_ids",
                "private_subnet_ids",
                "nat_gateway_ips",
            ],
            Self::Cluster => &[
                "cluster_issuer",
                "cluster_openid_connector",
                "cluster_worker_role",
                "cluster_public_load_balancer",
                "cluster_name",
            ],
            Self::Database => &[
                "db_admin_username",
                "db_admin_password",
                "db_endpoint",
                "db_proxy_endpoint",
                "db_proxy_username",
                "db_proxy_password",
            ],
            Self::Services => &["container_registry_url"],
            Self::App => &["app_service_account", "app_role_arn"],
        }
    }

    /// Outputs published as secrets
    pub fn secret_outputs(&self) -> &'static [&'static str] {
        match self {
            Self::Database => &["db_admin_password", "db_proxy_password"],
            _ => &[],
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.project())
    }
}

impl FromStr for StackKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vpc" | "network" => Ok(Self::Network),
            "eks" | "cluster" | "k" => Ok(Self::Cluster),
            "db" | "database" => Ok(Self::Database),
            "services" | "svcs" => Ok(Self::Services),
            "app" | "application" => Ok(Self::App),
            _ => Err(CoreError::UnknownStack {
                name: s.to_string(),
            }),
        }
    }
}

/// A stack instance in a given environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackId {
    pub kind: StackKind,
    pub environment: String,
}

impl StackId {
    pub fn new(kind: StackKind, environment: impl Into<String>) -> Self {
        Self {
            kind,
            environment: environment.into(),
        }
    }

    /// Like [`StackId::new`], rejecting invalid environment names
    pub fn parse(kind: StackKind, environment: impl Into<String>) -> Result<Self> {
        let environment = environment.into();
        validate_environment(&environment)?;
        Ok(Self::new(kind, environment))
    }

    /// Stack name, e.g. `demo-vpc`, also the base name of its resources
    pub fn name(&self) -> String {
        format!("{}-{}", self.environment, self.kind.prefix())
    }

    /// Fully qualified reference, e.g. `organization/eks/eks-demo`
    pub fn reference(&self) -> String {
        let project = self.kind.project();
        format!("{ORGANIZATION}/{project}/{project}-{}", self.environment)
    }

    /// Upstream stacks in the same environment
    pub fn dependencies(&self) -> Vec<StackId> {
        self.kind
            .dependencies()
            .iter()
            .map(|kind| StackId::new(*kind, self.environment.clone()))
            .collect()
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Dependency graph between named stacks
#[derive(Debug, Clone, Default)]
pub struct StackGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl StackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in stacks
    pub fn builtin() -> Self {
        let mut graph = Self::new();
        for kind in StackKind::ALL {
            graph.add(
                kind.project(),
                kind.dependencies().iter().map(|d| d.project()),
            );
        }
        graph
    }

    /// Add a stack and the stacks it depends on
    pub fn add<I, S>(&mut self, name: &str, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges.insert(
            name.to_string(),
            dependencies.into_iter().map(Into::into).collect(),
        );
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Stacks in apply order, dependencies first
    ///
    /// Ties are broken by insertion order so the result is deterministic.
    pub fn order(&self) -> Result<Vec<String>> {
        for (stack, deps) in &self.edges {
            if let Some(missing) = deps.iter().find(|d| !self.edges.contains_key(*d)) {
                return Err(CoreError::UnknownDependency {
                    stack: stack.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut result = Vec::with_capacity(self.edges.len());
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for name in self.edges.keys() {
            self.visit(name, &mut visited, &mut path, &mut result)?;
        }

        Ok(result)
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        result: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(CoreError::DependencyCycle { path: cycle });
        }

        path.push(name.to_string());
        for dep in self.edges.get(name).into_iter().flatten() {
            self.visit(dep, visited, path, result)?;
        }
        path.pop();

        visited.insert(name.to_string());
        result.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let order = StackGraph::builtin().order().unwrap();
        assert_eq!(order, vec!["vpc", "eks", "db", "services", "app"]);
    }

    #[test]
    fn test_order_respects_every_edge() {
        let order = StackGraph::builtin().order().unwrap();
        let pos = |name: &str| order.iter().position(|o| o == name).unwrap();
        for kind in StackKind::ALL {
            for dep in kind.dependencies() {
                assert!(pos(dep.project()) < pos(kind.project()));
            }
        }
    }

    #[test]
    fn test_injected_cycle_is_reported() {
        let mut graph = StackGraph::builtin();
        graph.add("vpc", ["app"]);

        let err = graph.order().unwrap_err();
        match &err {
            CoreError::DependencyCycle { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"app".to_string()));
                assert!(path.contains(&"vpc".to_string()));
            }
            other => panic!("expected cycle, got {other}"),
        }
        assert!(err.to_string().contains(" -> "));
    }

    #[test]
    fn test_self_cycle() {
        let mut graph = StackGraph::new();
        graph.add("a", ["a"]);
        assert!(matches!(
            graph.order(),
            Err(CoreError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = StackGraph::new();
        graph.add("app", ["db"]);
        let err = graph.order().unwrap_err();
        assert!(matches!(err, CoreError::UnknownDependency { .. }));
    }

    #[test]
    fn test_stack_names() {
        let id = StackId::new(StackKind::Cluster, "demo");
        assert_eq!(id.name(), "demo-k");
        assert_eq!(id.reference(), "organization/eks/eks-demo");
        assert_eq!(
            StackId::new(StackKind::Services, "demo").reference(),
            "organization/services/services-demo"
        );

        let app = StackId::new(StackKind::App, "prod");
        assert_eq!(
            app.dependencies(),
            vec![
                StackId::new(StackKind::Cluster, "prod"),
                StackId::new(StackKind::Database, "prod"),
            ]
        );
    }

    #[test]
    fn test_environment_names() {
        for name in ["demo", "prod", "staging-2", "a"] {
            assert!(validate_environment(name).is_ok(), "{name} should be valid");
        }
        for name in ["", "../x", "../../escaped", "Demo", "-demo", "demo-", "a/b", "a.b", "2demo"] {
            assert!(
                matches!(validate_environment(name), Err(CoreError::InvalidEnvironment { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_environment(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_parse_stack_id() {
        let id = StackId::parse(StackKind::Database, "prod").unwrap();
        assert_eq!(id.name(), "prod-db");
        assert!(StackId::parse(StackKind::Database, "../x").is_err());
        assert!(StackId::parse(StackKind::Database, "").is_err());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("vpc".parse::<StackKind>().unwrap(), StackKind::Network);
        assert_eq!("Database".parse::<StackKind>().unwrap(), StackKind::Database);
        assert!("queue".parse::<StackKind>().is_err());
    }

    #[test]
    fn test_secret_outputs_are_required() {
        for kind in StackKind::ALL {
            for secret in kind.secret_outputs() {
                assert!(kind.required_outputs().contains(secret));
            }
        }
    }
}
