//! Database stack

use stratus_core::{DatabaseConfig, StackKind};

use crate::components::database::{self, DatabaseArgs};
use crate::components::declaration_error;
use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::stacks::require_list;

pub fn build(ctx: &StackContext, config: &DatabaseConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(ctx.stack().clone());

    let Some(engine_version) = config.engine_version() else {
        return Err(declaration_error(
            "database",
            format!("unsupported database version '{}'", config.db_major_version),
        ));
    };

    let db = database::declare(
        &mut graph,
        &ctx.name(),
        &DatabaseArgs {
            vpc_id: ctx.require_output(StackKind::Network, "vpc_id")?,
            private_subnet_ids: require_list(ctx, StackKind::Network, "private_subnet_ids")?,
            cidr_blocks: config.cidr_blocks.clone(),
            major_version: config.db_major_version.clone(),
            engine_version,
            database_name: config.database_name.clone(),
            storage_size: config.db_storage_size,
            is_prod_database: config.is_prod_database,
            min_capacity: DatabaseConfig::MIN_CAPACITY,
            max_capacity: config.serverless_max_capacity,
            zone_name: config.zone_name.clone(),
            base_tags: ctx.base_tags(),
        },
    )?;

    graph.export("db_admin_username", &db.admin_username);
    graph.export("db_admin_password", &db.admin_password);
    graph.export("db_endpoint", &db.endpoint);
    graph.export("db_proxy_endpoint", &db.proxy_endpoint);
    graph.export("db_proxy_username", &db.proxy_username);
    graph.export("db_proxy_password", &db.proxy_password);
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures;
    use serde_json::json;

    fn config(prod: bool) -> DatabaseConfig {
        let mut config: DatabaseConfig = serde_yaml::from_str(fixtures::DATABASE_CONFIG).unwrap();
        config.is_prod_database = prod;
        config
    }

    #[test]
    fn test_secret_exports() {
        let graph = build(&fixtures::context(StackKind::Database), &config(false)).unwrap();
        let outputs = graph.outputs();
        assert_eq!(outputs["db_admin_username"], "root");
        for key in StackKind::Database.secret_outputs() {
            assert!(outputs[*key].get("$secret").is_some(), "{key} is not secret");
        }
    }

    #[test]
    fn test_production_flag() {
        let prod = build(&fixtures::context(StackKind::Database), &config(true)).unwrap();
        let cluster = prod.get("demo-db-db-cluster").unwrap();
        assert_eq!(cluster.properties["skipFinalSnapshot"], false);
        assert_eq!(cluster.properties["finalSnapshotIdentifier"], "demo-db-db-cluster");

        let dev = build(&fixtures::context(StackKind::Database), &config(false)).unwrap();
        let cluster = dev.get("demo-db-db-cluster").unwrap();
        assert_eq!(cluster.properties["skipFinalSnapshot"], true);
    }

    #[test]
    fn test_serverless_scaling() {
        let graph = build(&fixtures::context(StackKind::Database), &config(false)).unwrap();
        let cluster = graph.get("demo-db-db-cluster").unwrap();
        assert_eq!(
            cluster.properties["serverlessv2ScalingConfiguration"],
            json!({"minCapacity": 2.0, "maxCapacity": 3.0})
        );
        assert_eq!(cluster.properties["engineVersion"], "8.0.mysql_aurora.3.06.0");
    }
}
