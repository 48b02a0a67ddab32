//! Typed stack configuration
//!
//! Every stack reads a strongly typed config deserialized from layered
//! [`Values`]. Deserialization applies defaults and rejects unknown keys;
//! [`StackConfig::from_values`] then validates the whole config and reports
//! every problem at once, before any resource is declared.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::cidr::Ipv4Cidr;
use crate::error::{CoreError, Result, ValidationIssue};
use crate::stack::StackKind;
use crate::values::Values;

/// DNS name made of lowercase labels
static DNS_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
        .expect("valid regex")
});

/// Kubernetes object name (RFC 1123 label)
static K8S_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$")
        .expect("valid regex")
});

/// Environment variable and secret key
static ENV_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$")
        .expect("valid regex")
});

static EKS_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+$").expect("valid regex")
});

/// Aurora MySQL major versions with a parameter group, and their engine minor
pub const SUPPORTED_DB_VERSIONS: &[(&str, &str)] = &[("8.0", "3.06")];

/// Hosted zone used for DNS records and certificate validation
pub const DEFAULT_ZONE_NAME: &str = "cloudlan.net";

fn default_true() -> bool {
    true
}

fn default_zone_name() -> String {
    DEFAULT_ZONE_NAME.to_string()
}

/// Traffic captured by VPC flow logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowLogTraffic {
    Accept,
    Reject,
    All,
}

impl FlowLogTraffic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::All => "ALL",
        }
    }
}

fn default_flow_log_traffic() -> Option<FlowLogTraffic> {
    Some(FlowLogTraffic::All)
}

/// Network stack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub vpc_cidr: Ipv4Cidr,

    /// One public and one private subnet is created per zone
    pub availability_zones: Vec<String>,

    #[serde(default = "default_true")]
    pub create_s3_endpoint: bool,

    /// `null` disables flow logs
    #[serde(default = "default_flow_log_traffic")]
    pub flow_log_traffic: Option<FlowLogTraffic>,
}

impl NetworkConfig {
    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        if self.availability_zones.is_empty() {
            issues.push(ValidationIssue::new(
                "availability_zones",
                "at least one availability zone is required",
            ));
        }
        check_unique(&self.availability_zones, "availability_zones", issues);
        for (i, zone) in self.availability_zones.iter().enumerate() {
            if zone.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    format!("availability_zones[{i}]"),
                    "zone name is empty",
                ));
            }
        }

        let subnet_prefix = self.vpc_cidr.prefix() + 4;
        if subnet_prefix > 32 {
            issues.push(ValidationIssue::new(
                "vpc_cidr",
                format!("/{} is too small to carve /{} subnets", self.vpc_cidr.prefix(), subnet_prefix),
            ));
        } else if self.availability_zones.len() * 2 > 16 {
            issues.push(ValidationIssue::new(
                "availability_zones",
                format!(
                    "{} zones need {} subnets but only 16 fit in {}",
                    self.availability_zones.len(),
                    self.availability_zones.len() * 2,
                    self.vpc_cidr
                ),
            ));
        }
    }
}

/// Cluster stack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    pub cert_domain_name: String,

    #[serde(default)]
    pub cert_alt_names: Vec<String>,

    /// Hosted zone the certificate is validated in
    #[serde(default = "default_zone_name")]
    pub zone_name: String,

    pub eks_version: String,

    /// Worker AMI per Kubernetes version
    pub eks_images: IndexMap<String, String>,

    pub eks_worker_instance_type: String,

    pub eks_key_pair: String,

    #[serde(default = "ClusterConfig::default_min_size")]
    pub eks_worker_min_size: u32,

    #[serde(default = "ClusterConfig::default_max_size")]
    pub eks_worker_max_size: u32,

    #[serde(default = "default_true")]
    pub public_endpoint: bool,

    #[serde(default)]
    pub private_endpoint: bool,
}

impl ClusterConfig {
    fn default_min_size() -> u32 {
        2
    }

    fn default_max_size() -> u32 {
        10
    }

    /// Worker AMI for the configured Kubernetes version
    pub fn worker_image(&self) -> Option<&str> {
        self.eks_images.get(&self.eks_version).map(String::as_str)
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        check_dns_name(&self.cert_domain_name, "cert_domain_name", issues);
        for (i, name) in self.cert_alt_names.iter().enumerate() {
            check_dns_name(name, &format!("cert_alt_names[{i}]"), issues);
        }
        check_dns_name(&self.zone_name, "zone_name", issues);

        if !EKS_VERSION.is_match(&self.eks_version) {
            issues.push(ValidationIssue::new(
                "eks_version",
                format!("'{}' is not a <major>.<minor> version", self.eks_version),
            ));
        } else if self.worker_image().is_none() {
            issues.push(ValidationIssue::new(
                "eks_images",
                format!("no worker image for eks_version {}", self.eks_version),
            ));
        }

        check_not_blank(&self.eks_worker_instance_type, "eks_worker_instance_type", issues);
        check_not_blank(&self.eks_key_pair, "eks_key_pair", issues);

        if self.eks_worker_max_size == 0 {
            issues.push(ValidationIssue::new(
                "eks_worker_max_size",
                "must be at least 1",
            ));
        }
        if self.eks_worker_min_size > self.eks_worker_max_size {
            issues.push(ValidationIssue::new(
                "eks_worker_min_size",
                format!(
                    "min size {} exceeds max size {}",
                    self.eks_worker_min_size, self.eks_worker_max_size
                ),
            ));
        }
        if !self.public_endpoint && !self.private_endpoint {
            issues.push(ValidationIssue::new(
                "public_endpoint",
                "at least one of public_endpoint and private_endpoint must be enabled",
            ));
        }
    }
}

/// Database stack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub db_major_version: String,

    /// Client ranges allowed to reach port 3306
    pub cidr_blocks: Vec<Ipv4Cidr>,

    /// Storage size in GB
    #[serde(default = "DatabaseConfig::default_storage_size")]
    pub db_storage_size: u32,

    /// Production databases keep a final snapshot on destroy
    #[serde(default)]
    pub is_prod_database: bool,

    #[serde(default = "DatabaseConfig::default_max_capacity")]
    pub serverless_max_capacity: f64,

    #[serde(default = "default_zone_name")]
    pub zone_name: String,

    #[serde(default = "DatabaseConfig::default_database_name")]
    pub database_name: String,
}

impl DatabaseConfig {
    /// Lower serverless scaling bound
    pub const MIN_CAPACITY: f64 = 2.0;

    fn default_storage_size() -> u32 {
        20
    }

    fn default_max_capacity() -> f64 {
        3.0
    }

    fn default_database_name() -> String {
        "demoapp".to_string()
    }

    /// Full Aurora engine version for the configured major version
    pub fn engine_version(&self) -> Option<String> {
        SUPPORTED_DB_VERSIONS
            .iter()
            .find(|(major, _)| *major == self.db_major_version)
            .map(|(major, minor)| format!("{major}.mysql_aurora.{minor}.0"))
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        if self.engine_version().is_none() {
            let supported: Vec<&str> = SUPPORTED_DB_VERSIONS.iter().map(|(m, _)| *m).collect();
            issues.push(ValidationIssue::new(
                "db_major_version",
                format!(
                    "unsupported version '{}' (supported: {})",
                    self.db_major_version,
                    supported.join(", ")
                ),
            ));
        }
        if self.cidr_blocks.is_empty() {
            issues.push(ValidationIssue::new(
                "cidr_blocks",
                "at least one client CIDR block is required",
            ));
        }
        if self.db_storage_size == 0 {
            issues.push(ValidationIssue::new("db_storage_size", "must be positive"));
        }
        if self.serverless_max_capacity < Self::MIN_CAPACITY {
            issues.push(ValidationIssue::new(
                "serverless_max_capacity",
                format!(
                    "must be at least the minimum capacity {}",
                    Self::MIN_CAPACITY
                ),
            ));
        }
        check_dns_name(&self.zone_name, "zone_name", issues);
        if self.database_name.is_empty()
            || !self
                .database_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            issues.push(ValidationIssue::new(
                "database_name",
                "must be alphanumeric",
            ));
        }
    }
}

/// Cluster services stack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesConfig {
    pub eks_ebs_csi_chart_version: String,

    #[serde(default = "ServicesConfig::default_traefik_version")]
    pub traefik_chart_version: String,

    /// IAM user ARNs granted cluster admin
    #[serde(default)]
    pub kube_users: Vec<String>,

    /// IAM role ARNs granted cluster admin
    #[serde(default)]
    pub kube_admin_roles: Vec<String>,

    #[serde(default = "ServicesConfig::default_registry_name")]
    pub registry_name: String,

    #[serde(default = "ServicesConfig::default_metrics_manifest")]
    pub metrics_server_manifest: String,
}

impl ServicesConfig {
    fn default_traefik_version() -> String {
        "v23.2.0".to_string()
    }

    fn default_registry_name() -> String {
        "demoapp".to_string()
    }

    fn default_metrics_manifest() -> String {
        "metric_server.yaml".to_string()
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        check_chart_version(&self.eks_ebs_csi_chart_version, "eks_ebs_csi_chart_version", issues);
        check_chart_version(&self.traefik_chart_version, "traefik_chart_version", issues);

        for (i, user) in self.kube_users.iter().enumerate() {
            check_iam_arn(user, ":user/", &format!("kube_users[{i}]"), issues);
        }
        for (i, role) in self.kube_admin_roles.iter().enumerate() {
            check_iam_arn(role, ":role/", &format!("kube_admin_roles[{i}]"), issues);
        }
        check_unique(&self.kube_users, "kube_users", issues);

        if !K8S_NAME.is_match(&self.registry_name) {
            issues.push(ValidationIssue::new(
                "registry_name",
                "must be lowercase alphanumeric or '-'",
            ));
        }
        check_not_blank(&self.metrics_server_manifest, "metrics_server_manifest", issues);
    }
}

/// Hostname routed to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hostname {
    pub name: String,

    /// Create a CNAME to the cluster load balancer
    #[serde(default = "default_true")]
    pub create_record: bool,
}

/// Database credentials injected into the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbCredentials {
    /// Admin credentials against the cluster endpoint
    #[default]
    Direct,
    /// Credentials held by the connection proxy
    Proxy,
}

/// Application stack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_name")]
    pub app_name: String,

    #[serde(default = "AppConfig::default_name")]
    pub namespace: String,

    pub app_image: String,

    #[serde(default = "AppConfig::default_ports")]
    pub container_ports: Vec<u16>,

    /// Service port the ingress route targets
    #[serde(default = "AppConfig::default_ingress_port")]
    pub ingress_port: u16,

    #[serde(default)]
    pub app_environment_variables: IndexMap<String, String>,

    /// Overlaid on the default database credentials
    #[serde(default)]
    pub app_secrets: IndexMap<String, String>,

    #[serde(default)]
    pub app_hostnames: Vec<Hostname>,

    #[serde(default = "AppConfig::default_min_replicas")]
    pub app_min_replicas: i32,

    #[serde(default = "AppConfig::default_max_replicas")]
    pub app_max_replicas: i32,

    /// Extra IAM policy statements for the workload role
    #[serde(default)]
    pub service_permissions: Vec<JsonValue>,

    #[serde(default)]
    pub db_credentials: DbCredentials,

    #[serde(default = "default_zone_name")]
    pub zone_name: String,
}

impl AppConfig {
    fn default_name() -> String {
        "demoapp".to_string()
    }

    fn default_ports() -> Vec<u16> {
        vec![3000]
    }

    fn default_ingress_port() -> u16 {
        3000
    }

    fn default_min_replicas() -> i32 {
        1
    }

    fn default_max_replicas() -> i32 {
        6
    }

    /// Name shared by the deployment, service account and service
    pub fn service_name(&self) -> String {
        format!("{}-app", self.app_name)
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        check_k8s_name(&self.app_name, "app_name", issues);
        check_k8s_name(&self.namespace, "namespace", issues);
        check_not_blank(&self.app_image, "app_image", issues);

        if self.container_ports.is_empty() {
            issues.push(ValidationIssue::new(
                "container_ports",
                "at least one container port is required",
            ));
        }
        for (i, port) in self.container_ports.iter().enumerate() {
            if *port == 0 {
                issues.push(ValidationIssue::new(
                    format!("container_ports[{i}]"),
                    "port must be between 1 and 65535",
                ));
            }
        }
        check_unique(&self.container_ports, "container_ports", issues);
        if !self.container_ports.contains(&self.ingress_port) {
            issues.push(ValidationIssue::new(
                "ingress_port",
                format!("{} is not one of the container ports", self.ingress_port),
            ));
        }

        for key in self.app_environment_variables.keys() {
            check_env_key(key, &format!("app_environment_variables.{key}"), issues);
        }
        for key in self.app_secrets.keys() {
            check_env_key(key, &format!("app_secrets.{key}"), issues);
        }

        for (i, host) in self.app_hostnames.iter().enumerate() {
            check_dns_name(&host.name, &format!("app_hostnames[{i}].name"), issues);
        }
        let names: Vec<&str> = self.app_hostnames.iter().map(|h| h.name.as_str()).collect();
        check_unique(&names, "app_hostnames", issues);

        if self.app_min_replicas < 1 {
            issues.push(ValidationIssue::new(
                "app_min_replicas",
                "must be at least 1",
            ));
        }
        if self.app_min_replicas > self.app_max_replicas {
            issues.push(ValidationIssue::new(
                "app_min_replicas",
                format!(
                    "min replicas {} exceeds max replicas {}",
                    self.app_min_replicas, self.app_max_replicas
                ),
            ));
        }

        for (i, statement) in self.service_permissions.iter().enumerate() {
            let path = format!("service_permissions[{i}]");
            match statement {
                JsonValue::Object(map) => {
                    for key in ["Effect", "Action"] {
                        if !map.contains_key(key) {
                            issues.push(ValidationIssue::new(
                                path.clone(),
                                format!("statement is missing '{key}'"),
                            ));
                        }
                    }
                }
                _ => issues.push(ValidationIssue::new(path, "statement must be an object")),
            }
        }

        check_dns_name(&self.zone_name, "zone_name", issues);
    }
}

/// Configuration of any stack
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StackConfig {
    Network(NetworkConfig),
    Cluster(ClusterConfig),
    Database(DatabaseConfig),
    Services(ServicesConfig),
    App(AppConfig),
}

impl StackConfig {
    /// Deserialize and validate the config of a stack
    pub fn from_values(kind: StackKind, values: &Values) -> Result<Self> {
        let stack = kind.project().to_string();
        let invalid = |e: serde_json::Error| CoreError::InvalidConfig {
            stack: stack.clone(),
            issues: vec![ValidationIssue::new("config", e.to_string())],
        };

        let config = match kind {
            StackKind::Network => Self::Network(serde_json::from_value(values.inner().clone()).map_err(invalid)?),
            StackKind::Cluster => Self::Cluster(serde_json::from_value(values.inner().clone()).map_err(invalid)?),
            StackKind::Database => Self::Database(serde_json::from_value(values.inner().clone()).map_err(invalid)?),
            StackKind::Services => Self::Services(serde_json::from_value(values.inner().clone()).map_err(invalid)?),
            StackKind::App => Self::App(serde_json::from_value(values.inner().clone()).map_err(invalid)?),
        };

        let issues = config.validate();
        if issues.is_empty() {
            Ok(config)
        } else {
            Err(CoreError::InvalidConfig { stack, issues })
        }
    }

    pub fn kind(&self) -> StackKind {
        match self {
            Self::Network(_) => StackKind::Network,
            Self::Cluster(_) => StackKind::Cluster,
            Self::Database(_) => StackKind::Database,
            Self::Services(_) => StackKind::Services,
            Self::App(_) => StackKind::App,
        }
    }

    /// Every problem with this config
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        match self {
            Self::Network(c) => c.validate(&mut issues),
            Self::Cluster(c) => c.validate(&mut issues),
            Self::Database(c) => c.validate(&mut issues),
            Self::Services(c) => c.validate(&mut issues),
            Self::App(c) => c.validate(&mut issues),
        }
        issues
    }
}

fn check_not_blank(value: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(path, "must not be empty"));
    }
}

fn check_dns_name(value: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if value.len() > 253 || !DNS_NAME.is_match(value) {
        issues.push(ValidationIssue::new(
            path,
            format!("'{value}' is not a valid DNS name"),
        ));
    }
}

fn check_k8s_name(value: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !K8S_NAME.is_match(value) {
        issues.push(ValidationIssue::new(
            path,
            format!("'{value}' is not a valid Kubernetes name"),
        ));
    }
}

fn check_env_key(key: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !ENV_KEY.is_match(key) {
        issues.push(ValidationIssue::new(
            path,
            format!("'{key}' is not a valid variable name"),
        ));
    }
}

fn check_chart_version(value: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    let bare = value.strip_prefix('v').unwrap_or(value);
    if let Err(e) = semver::Version::parse(bare) {
        issues.push(ValidationIssue::new(
            path,
            format!("'{value}' is not a semantic version: {e}"),
        ));
    }
}

fn check_iam_arn(value: &str, kind: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !value.starts_with("arn:aws:iam::") || !value.contains(kind) {
        issues.push(ValidationIssue::new(
            path,
            format!("'{value}' is not an IAM {} ARN", kind.trim_matches(|c| c == ':' || c == '/')),
        ));
    }
}

fn check_unique<T: PartialEq + std::fmt::Debug>(
    items: &[T],
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            issues.push(ValidationIssue::new(
                format!("{path}[{i}]"),
                format!("duplicate entry {item:?}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(yaml: &str) -> Values {
        Values::from_yaml(yaml).unwrap()
    }

    fn issues_of(err: CoreError) -> Vec<ValidationIssue> {
        match err {
            CoreError::InvalidConfig { issues, .. } => issues,
            other => panic!("expected InvalidConfig, got {other}"),
        }
    }

    #[test]
    fn test_network_defaults() {
        let config = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.0/16\navailability_zones: [us-east-1a, us-east-1f]\n"),
        )
        .unwrap();
        let StackConfig::Network(net) = config else {
            panic!("wrong config kind");
        };
        assert!(net.create_s3_endpoint);
        assert_eq!(net.flow_log_traffic, Some(FlowLogTraffic::All));
    }

    #[test]
    fn test_network_flow_logs_disabled_with_null() {
        let config = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.0/16\navailability_zones: [a]\nflow_log_traffic: null\n"),
        )
        .unwrap();
        let StackConfig::Network(net) = config else {
            panic!("wrong config kind");
        };
        assert_eq!(net.flow_log_traffic, None);
    }

    #[test]
    fn test_network_rejects_empty_zones() {
        let err = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.0/16\navailability_zones: []\n"),
        )
        .unwrap_err();
        let issues = issues_of(err);
        assert!(issues.iter().any(|i| i.path == "availability_zones"));
    }

    #[test]
    fn test_network_rejects_bad_cidr() {
        let err = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.1/16\navailability_zones: [a]\n"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("outside the prefix"));
    }

    #[test]
    fn test_network_rejects_tiny_cidr() {
        let err = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.0/30\navailability_zones: [a]\n"),
        )
        .unwrap_err();
        assert!(issues_of(err).iter().any(|i| i.path == "vpc_cidr"));
    }

    #[test]
    fn test_missing_required_key() {
        let err = StackConfig::from_values(StackKind::Network, &values("availability_zones: [a]\n"))
            .unwrap_err();
        assert!(err.to_string().contains("vpc_cidr"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = StackConfig::from_values(
            StackKind::Network,
            &values("vpc_cidr: 10.0.0.0/16\navailability_zones: [a]\nvpc_cdir: x\n"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("vpc_cdir"));
    }

    const CLUSTER: &str = r#"
cert_domain_name: "*.demo.cloudlan.net"
eks_version: "1.27"
eks_images:
  "1.27": ami-0123456789
eks_worker_instance_type: t3.large
eks_key_pair: demo
"#;

    #[test]
    fn test_cluster_defaults() {
        let StackConfig::Cluster(c) =
            StackConfig::from_values(StackKind::Cluster, &values(CLUSTER)).unwrap()
        else {
            panic!("wrong config kind");
        };
        assert_eq!(c.eks_worker_min_size, 2);
        assert_eq!(c.eks_worker_max_size, 10);
        assert_eq!(c.worker_image(), Some("ami-0123456789"));
        assert_eq!(c.zone_name, DEFAULT_ZONE_NAME);
        assert!(c.public_endpoint);
        assert!(!c.private_endpoint);
    }

    #[test]
    fn test_cluster_worker_bounds() {
        let mut v = values(CLUSTER);
        v.set("eks_worker_min_size", 5.into()).unwrap();
        v.set("eks_worker_max_size", 3.into()).unwrap();
        let issues = issues_of(StackConfig::from_values(StackKind::Cluster, &v).unwrap_err());
        assert!(issues.iter().any(|i| i.path == "eks_worker_min_size"));
    }

    #[test]
    fn test_cluster_requires_image_for_version() {
        let mut v = values(CLUSTER);
        v.set("eks_version", "1.29".into()).unwrap();
        let issues = issues_of(StackConfig::from_values(StackKind::Cluster, &v).unwrap_err());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "eks_images");
    }

    #[test]
    fn test_database_defaults_and_engine_version() {
        let StackConfig::Database(db) = StackConfig::from_values(
            StackKind::Database,
            &values("db_major_version: \"8.0\"\ncidr_blocks: [10.0.0.0/16]\n"),
        )
        .unwrap() else {
            panic!("wrong config kind");
        };
        assert_eq!(db.db_storage_size, 20);
        assert!(!db.is_prod_database);
        assert_eq!(db.serverless_max_capacity, 3.0);
        assert_eq!(db.database_name, "demoapp");
        assert_eq!(db.engine_version().unwrap(), "8.0.mysql_aurora.3.06.0");
    }

    #[test]
    fn test_database_collects_all_issues() {
        let err = StackConfig::from_values(
            StackKind::Database,
            &values("db_major_version: \"5.7\"\ncidr_blocks: []\nserverless_max_capacity: 1\n"),
        )
        .unwrap_err();
        let paths: Vec<String> = issues_of(err).into_iter().map(|i| i.path).collect();
        assert_eq!(
            paths,
            vec!["db_major_version", "cidr_blocks", "serverless_max_capacity"]
        );
    }

    #[test]
    fn test_services_chart_versions() {
        let StackConfig::Services(s) = StackConfig::from_values(
            StackKind::Services,
            &values("eks_ebs_csi_chart_version: 2.20.0\n"),
        )
        .unwrap() else {
            panic!("wrong config kind");
        };
        assert_eq!(s.traefik_chart_version, "v23.2.0");
        assert!(s.kube_users.is_empty());

        let err = StackConfig::from_values(
            StackKind::Services,
            &values("eks_ebs_csi_chart_version: latest\nkube_users: [bob]\n"),
        )
        .unwrap_err();
        let paths: Vec<String> = issues_of(err).into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["eks_ebs_csi_chart_version", "kube_users[0]"]);
    }

    #[test]
    fn test_app_defaults() {
        let StackConfig::App(app) =
            StackConfig::from_values(StackKind::App, &values("app_image: nginx:1.27\n")).unwrap()
        else {
            panic!("wrong config kind");
        };
        assert_eq!(app.app_name, "demoapp");
        assert_eq!(app.namespace, "demoapp");
        assert_eq!(app.service_name(), "demoapp-app");
        assert_eq!(app.container_ports, vec![3000]);
        assert_eq!(app.app_min_replicas, 1);
        assert_eq!(app.app_max_replicas, 6);
        assert_eq!(app.db_credentials, DbCredentials::Direct);
    }

    #[test]
    fn test_hostname_create_record_defaults_true() {
        let StackConfig::App(app) = StackConfig::from_values(
            StackKind::App,
            &values(
                "app_image: x\napp_hostnames:\n  - name: a.cloudlan.net\n  - name: b.cloudlan.net\n    create_record: false\n",
            ),
        )
        .unwrap() else {
            panic!("wrong config kind");
        };
        assert!(app.app_hostnames[0].create_record);
        assert!(!app.app_hostnames[1].create_record);
    }

    #[test]
    fn test_replica_bounds() {
        let equal = values("app_image: x\napp_min_replicas: 3\napp_max_replicas: 3\n");
        assert!(StackConfig::from_values(StackKind::App, &equal).is_ok());

        let inverted = values("app_image: x\napp_min_replicas: 4\napp_max_replicas: 3\n");
        let issues =
            issues_of(StackConfig::from_values(StackKind::App, &inverted).unwrap_err());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "app_min_replicas");
    }

    #[test]
    fn test_app_ingress_port_must_be_exposed() {
        let v = values("app_image: x\ncontainer_ports: [8080]\n");
        let issues = issues_of(StackConfig::from_values(StackKind::App, &v).unwrap_err());
        assert_eq!(issues[0].path, "ingress_port");
    }

    #[test]
    fn test_app_rejects_malformed_statement() {
        let v = values("app_image: x\nservice_permissions:\n  - Effect: Allow\n");
        let issues = issues_of(StackConfig::from_values(StackKind::App, &v).unwrap_err());
        assert!(issues[0].message.contains("Action"));
    }
}
