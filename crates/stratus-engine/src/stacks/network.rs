//! Network stack: VPC, subnets and NAT

use stratus_core::{NetworkConfig, lit};

use crate::components::network::{self, NetworkArgs};
use crate::components::output_list;
use crate::context::StackContext;
use crate::error::Result;
use crate::graph::ResourceGraph;

pub fn build(ctx: &StackContext, config: &NetworkConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(ctx.stack().clone());
    let name = ctx.name();

    let vpc = network::declare(
        &mut graph,
        &name,
        &NetworkArgs {
            description: format!("{} VPC", ctx.environment()),
            base_cidr: config.vpc_cidr,
            availability_zones: config.availability_zones.clone(),
            create_s3_endpoint: config.create_s3_endpoint,
            flow_log_traffic: config.flow_log_traffic,
            base_tags: ctx.base_tags(),
        },
    )?;

    graph.export("vpc_id", &vpc.vpc_id);
    graph.export("vpc_cidr", &lit(config.vpc_cidr.to_string()));
    graph.export("public_subnet_ids", &output_list(&vpc.public_subnet_ids));
    graph.export("private_subnet_ids", &output_list(&vpc.private_subnet_ids));
    graph.export("nat_gateway_ips", &output_list(&vpc.nat_gateway_ips));
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures;
    use serde_json::json;
    use stratus_core::StackKind;

    fn config() -> NetworkConfig {
        serde_yaml::from_str(fixtures::NETWORK_CONFIG).unwrap()
    }

    #[test]
    fn test_two_zones() {
        let graph = build(&fixtures::context(StackKind::Network), &config()).unwrap();
        let outputs = graph.outputs();
        assert_eq!(outputs["public_subnet_ids"].as_array().unwrap().len(), 2);
        assert_eq!(outputs["private_subnet_ids"].as_array().unwrap().len(), 2);
        assert_eq!(outputs["nat_gateway_ips"].as_array().unwrap().len(), 2);
        assert_eq!(outputs["vpc_cidr"], "10.0.0.0/16");
        assert_eq!(outputs["vpc_id"], json!({"$ref": "demo-vpc-vpc.id"}));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_environment_tag() {
        let graph = build(&fixtures::context(StackKind::Network), &config()).unwrap();
        let vpc = graph.get("demo-vpc-vpc").unwrap();
        assert_eq!(vpc.properties["tags"]["Environment"], "demo");
    }
}
