//! Cluster services stack

use stratus_core::{ServicesConfig, StackKind};

use crate::components::services::{self, ServicesArgs};
use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;

pub fn build(ctx: &StackContext, config: &ServicesConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(ctx.stack().clone());

    let svcs = services::declare(
        &mut graph,
        &ctx.name(),
        &ServicesArgs {
            worker_role_arn: ctx.require_output(StackKind::Cluster, "cluster_worker_role")?,
            kube_users: config.kube_users.clone(),
            kube_admin_roles: config.kube_admin_roles.clone(),
            ebs_csi_chart_version: config.eks_ebs_csi_chart_version.clone(),
            traefik_chart_version: config.traefik_chart_version.clone(),
            registry_name: config.registry_name.clone(),
            metrics_server_manifest: config.metrics_server_manifest.clone(),
            base_tags: ctx.base_tags(),
        },
    )?;

    graph.export("container_registry_url", &svcs.registry_url);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::stacks::fixtures;
    use indexmap::IndexMap;
    use stratus_core::StackId;

    fn config() -> ServicesConfig {
        serde_yaml::from_str(fixtures::SERVICES_CONFIG).unwrap()
    }

    #[test]
    fn test_worker_role_from_cluster() {
        let graph = build(&fixtures::context(StackKind::Services), &config()).unwrap();
        let auth = graph.get("demo-svcs-kauth").unwrap();
        let roles: serde_yaml::Value =
            serde_yaml::from_str(auth.properties["data"]["mapRoles"].as_str().unwrap()).unwrap();
        assert_eq!(roles[0]["rolearn"], "arn:aws:iam::123456789012:role/demo-k-worker-role");
        assert!(graph.outputs().contains_key("container_registry_url"));
    }

    #[test]
    fn test_cluster_outputs_required() {
        let ctx = StackContext::new(
            StackId::new(StackKind::Services, "demo"),
            IndexMap::from([(StackKind::Network, fixtures::network_outputs())]),
        );
        assert!(matches!(ctx.unwrap_err(), EngineError::UpstreamMissing { ref stack } if stack == "demo-k"));
    }
}
