//! Cluster stack: certificate, control plane, workers and ingress load balancer

use stratus_core::{ClusterConfig, StackKind, lit};

use crate::components::certificate::{self, CertificateArgs};
use crate::components::cluster::{self, ClusterArgs};
use crate::components::declaration_error;
use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::stacks::require_list;

pub fn build(ctx: &StackContext, config: &ClusterConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(ctx.stack().clone());
    let env = ctx.environment();
    let base_tags = ctx.base_tags();

    let Some(worker_image) = config.worker_image() else {
        return Err(declaration_error(
            "cluster",
            format!("no worker image for eks_version {}", config.eks_version),
        ));
    };

    let cert = certificate::declare(
        &mut graph,
        &format!("{env}-certs"),
        None,
        &CertificateArgs {
            domain_name: config.cert_domain_name.clone(),
            alt_names: config.cert_alt_names.clone(),
            zone_name: config.zone_name.clone(),
            base_tags: base_tags.clone(),
        },
    )?;

    let eks = cluster::declare(
        &mut graph,
        &ctx.name(),
        &ClusterArgs {
            vpc_id: ctx.require_output(StackKind::Network, "vpc_id")?,
            public_subnet_ids: require_list(ctx, StackKind::Network, "public_subnet_ids")?,
            private_subnet_ids: require_list(ctx, StackKind::Network, "private_subnet_ids")?,
            certificate_arn: cert.arn,
            eks_version: config.eks_version.clone(),
            worker_image_id: worker_image.to_string(),
            worker_instance_type: config.eks_worker_instance_type.clone(),
            worker_key_name: config.eks_key_pair.clone(),
            worker_min_size: config.eks_worker_min_size,
            worker_max_size: config.eks_worker_max_size,
            public_endpoint: config.public_endpoint,
            private_endpoint: config.private_endpoint,
            base_tags,
        },
    )?;

    graph.export("cluster_public_load_balancer", &eks.public_load_balancer);
    graph.export("cluster_name", &lit(eks.cluster_name));
    graph.export("cluster_worker_role", &eks.worker_role_arn);
    graph.export("cluster_issuer", &eks.issuer);
    graph.export("cluster_openid_connector", &eks.openid_connector_arn);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::stacks::fixtures;
    use indexmap::IndexMap;
    use serde_json::json;
    use stratus_core::{StackId, StackOutputs};

    fn config() -> ClusterConfig {
        serde_yaml::from_str(fixtures::CLUSTER_CONFIG).unwrap()
    }

    #[test]
    fn test_exports() {
        let graph = build(&fixtures::context(StackKind::Cluster), &config()).unwrap();
        let outputs = graph.outputs();
        assert_eq!(outputs["cluster_name"], "demo-k-eks-cluster");
        for key in StackKind::Cluster.required_outputs() {
            assert!(outputs.contains_key(*key), "missing {key}");
        }
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_upstream_subnets_used() {
        let graph = build(&fixtures::context(StackKind::Cluster), &config()).unwrap();
        let cluster = graph.get("demo-k-eks-cluster").unwrap();
        assert_eq!(
            cluster.properties["vpcConfig"]["subnetIds"],
            json!(["subnet-priv-a", "subnet-priv-b"])
        );
        let alb = graph.get("demo-k-eks-lb").unwrap();
        assert_eq!(alb.properties["subnets"], json!(["subnet-pub-a", "subnet-pub-b"]));
    }

    #[test]
    fn test_certificate_feeds_listener() {
        let graph = build(&fixtures::context(StackKind::Cluster), &config()).unwrap();
        assert!(graph.contains("demo-certs-certificate"));
        let deps = graph.dependencies("demo-k-eks-lb-https-listener");
        assert!(deps.contains(&"demo-certs-certificate".to_string()));
    }

    #[test]
    fn test_missing_network_output() {
        let mut network = StackOutputs::new();
        network.insert("vpc_id", json!("vpc-123"));
        let ctx = StackContext::new(
            StackId::new(StackKind::Cluster, "demo"),
            IndexMap::from([(StackKind::Network, network)]),
        )
        .unwrap();

        let err = build(&ctx, &config()).unwrap_err();
        assert!(matches!(err, EngineError::MissingOutput { ref key, .. } if key == "public_subnet_ids"));
    }
}
