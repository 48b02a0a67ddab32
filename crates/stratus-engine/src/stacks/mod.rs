//! The five stack programs
//!
//! Each stack reads its typed config and the outputs of its upstream stacks
//! from the [`StackContext`], declares its component(s) and exports the
//! outputs downstream stacks rely on.

pub mod app;
pub mod cluster;
pub mod database;
pub mod network;
pub mod services;

use stratus_core::{CoreError, Output, StackConfig, StackKind};

use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;

/// Evaluate the stack program matching `config`
pub fn evaluate(ctx: &StackContext, config: &StackConfig) -> Result<ResourceGraph> {
    match config {
        StackConfig::Network(c) => network::build(ctx, c),
        StackConfig::Cluster(c) => cluster::build(ctx, c),
        StackConfig::Database(c) => database::build(ctx, c),
        StackConfig::Services(c) => services::build(ctx, c),
        StackConfig::App(c) => app::build(ctx, c),
    }
}

/// Upstream list output as one output per item
pub(crate) fn require_list(ctx: &StackContext, kind: StackKind, key: &str) -> Result<Vec<Output<String>>> {
    let list: Output<Vec<String>> = ctx.require_output(kind, key)?;
    let secret = list.is_secret();
    let Some(items) = list.value() else {
        return Err(CoreError::Unresolved {
            expression: key.to_string(),
        }
        .into());
    };
    Ok(items
        .iter()
        .map(|item| {
            if secret {
                Output::secret(item.clone())
            } else {
                Output::known(item.clone())
            }
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Resolved upstream outputs and configs shared by stack and engine tests

    use indexmap::IndexMap;
    use serde_json::json;
    use stratus_core::{StackId, StackKind, StackOutputs};

    use crate::context::StackContext;

    pub fn network_outputs() -> StackOutputs {
        let mut outputs = StackOutputs::new();
        outputs.insert("vpc_id", json!("vpc-123"));
        outputs.insert("vpc_cidr", json!("10.0.0.0/16"));
        outputs.insert("public_subnet_ids", json!(["subnet-pub-a", "subnet-pub-b"]));
        outputs.insert("private_subnet_ids", json!(["subnet-priv-a", "subnet-priv-b"]));
        outputs.insert("nat_gateway_ips", json!(["1.2.3.4", "5.6.7.8"]));
        outputs
    }

    pub fn cluster_outputs() -> StackOutputs {
        let mut outputs = StackOutputs::new();
        outputs.insert("cluster_issuer", json!("https://x.eks.amazonaws.com/id/ABC"));
        outputs.insert(
            "cluster_openid_connector",
            json!("arn:aws:iam::123456789012:oidc-provider/x.eks.amazonaws.com/id/ABC"),
        );
        outputs.insert("cluster_worker_role", json!("arn:aws:iam::123456789012:role/demo-k-worker-role"));
        outputs.insert("cluster_public_load_balancer", json!("demo-k-alb-1.eu-west-1.elb.amazonaws.com"));
        outputs.insert("cluster_name", json!("demo-k-eks-cluster"));
        outputs
    }

    pub fn database_outputs() -> StackOutputs {
        let mut outputs = StackOutputs::new();
        outputs.insert("db_admin_username", json!("root"));
        outputs.insert_secret("db_admin_password", json!("admin-pw"));
        outputs.insert("db_endpoint", json!("demo-db.cluster-1.eu-west-1.rds.amazonaws.com"));
        outputs.insert("db_proxy_endpoint", json!("demo-db-proxy.eu-west-1.rds.amazonaws.com"));
        outputs.insert("db_proxy_username", json!("proxy-user"));
        outputs.insert_secret("db_proxy_password", json!("proxy-pw"));
        outputs
    }

    pub fn outputs_of(kind: StackKind) -> StackOutputs {
        match kind {
            StackKind::Network => network_outputs(),
            StackKind::Cluster => cluster_outputs(),
            StackKind::Database => database_outputs(),
            _ => StackOutputs::new(),
        }
    }

    /// Context with every dependency of `kind` resolved
    pub fn context(kind: StackKind) -> StackContext {
        let upstream: IndexMap<StackKind, StackOutputs> = kind
            .dependencies()
            .iter()
            .map(|dep| (*dep, outputs_of(*dep)))
            .collect();
        StackContext::new(StackId::new(kind, "demo"), upstream).unwrap()
    }

    pub const NETWORK_CONFIG: &str = r#"
vpc_cidr: 10.0.0.0/16
availability_zones: [eu-west-1a, eu-west-1c]
"#;

    pub const CLUSTER_CONFIG: &str = r#"
cert_domain_name: k.cloudlan.net
eks_version: "1.27"
eks_images:
  "1.27": ami-0123456789abcdef0
eks_worker_instance_type: t3.medium
eks_key_pair: demo-key
"#;

    pub const DATABASE_CONFIG: &str = r#"
db_major_version: "8.0"
cidr_blocks: [10.0.0.0/16]
"#;

    pub const SERVICES_CONFIG: &str = r#"
eks_ebs_csi_chart_version: 2.22.0
kube_users: [arn:aws:iam::123456789012:user/alice]
"#;

    pub const APP_CONFIG: &str = r#"
app_image: 123456789012.dkr.ecr.eu-west-1.amazonaws.com/demoapp:1.0
app_hostnames:
  - name: app.cloudlan.net
  - name: www.cloudlan.net
    create_record: false
"#;

    pub fn config_source(kind: StackKind) -> &'static str {
        match kind {
            StackKind::Network => NETWORK_CONFIG,
            StackKind::Cluster => CLUSTER_CONFIG,
            StackKind::Database => DATABASE_CONFIG,
            StackKind::Services => SERVICES_CONFIG,
            StackKind::App => APP_CONFIG,
        }
    }
}
