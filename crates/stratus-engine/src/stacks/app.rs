//! Application stack

use stratus_core::{AppConfig, DbCredentials, StackKind};

use crate::components::app::{self, AppArgs, secret_data};
use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;

pub fn build(ctx: &StackContext, config: &AppConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(ctx.stack().clone());

    let (username_key, password_key) = match config.db_credentials {
        DbCredentials::Direct => ("db_admin_username", "db_admin_password"),
        DbCredentials::Proxy => ("db_proxy_username", "db_proxy_password"),
    };
    let secrets = secret_data(
        ctx.require_output(StackKind::Database, username_key)?,
        ctx.require_output(StackKind::Database, password_key)?,
        &config.app_secrets,
    );

    let deployed = app::declare(
        &mut graph,
        &ctx.name(),
        &AppArgs {
            app_name: config.app_name.clone(),
            service_name: config.service_name(),
            namespace: config.namespace.clone(),
            image: config.app_image.clone(),
            container_ports: config.container_ports.clone(),
            ingress_port: config.ingress_port,
            environment: config.app_environment_variables.clone(),
            secrets,
            hostnames: config.app_hostnames.clone(),
            min_replicas: config.app_min_replicas,
            max_replicas: config.app_max_replicas,
            service_permissions: config.service_permissions.clone(),
            issuer: ctx.require_output(StackKind::Cluster, "cluster_issuer")?,
            openid_connector_arn: ctx.require_output(StackKind::Cluster, "cluster_openid_connector")?,
            public_load_balancer: ctx.require_output(StackKind::Cluster, "cluster_public_load_balancer")?,
            zone_name: config.zone_name.clone(),
            base_tags: ctx.base_tags(),
        },
    )?;

    graph.export("app_service_account", &deployed.service_account);
    graph.export("app_role_arn", &deployed.role_arn);
    Ok(graph)
}
