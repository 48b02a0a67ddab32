//! VPC with public and private subnets per availability zone

use indexmap::IndexMap;
use serde_json::json;
use stratus_core::{FlowLogTraffic, Ipv4Cidr, Output, lit};

use super::{declaration_error, output_list, tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceSpec};
use crate::policy::{PolicyDocument, Statement, assume_role_policy};

const COMPONENT: &str = "stratus:components:Network";

/// Each subnet is this many bits longer than the VPC block
const SUBNET_EXTRA_BITS: u8 = 4;

#[derive(Debug, Clone)]
pub struct NetworkArgs {
    pub description: String,
    pub base_cidr: Ipv4Cidr,
    pub availability_zones: Vec<String>,
    pub create_s3_endpoint: bool,
    /// Flow logs to CloudWatch when set
    pub flow_log_traffic: Option<FlowLogTraffic>,
    pub base_tags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NetworkOutputs {
    pub vpc: ResourceHandle,
    pub vpc_id: Output<String>,
    pub vpc_cidr: Output<String>,
    /// In zone order
    pub public_subnet_ids: Vec<Output<String>>,
    /// In zone order
    pub private_subnet_ids: Vec<Output<String>>,
    /// One public address per zone
    pub nat_gateway_ips: Vec<Output<String>>,
}

/// Subnet blocks: public subnet *i* is block *i*, private subnet *i* is
/// block `zones + i`
pub fn carve_subnets(base: &Ipv4Cidr, zones: usize) -> Result<(Vec<Ipv4Cidr>, Vec<Ipv4Cidr>)> {
    if zones == 0 {
        return Err(declaration_error(COMPONENT, "at least one availability zone is required"));
    }
    let prefix = base.prefix() + SUBNET_EXTRA_BITS;
    let block = |index: usize| {
        let index = u32::try_from(index).map_err(|e| declaration_error(COMPONENT, e))?;
        base.subnet(prefix, index)
            .map_err(|e| declaration_error(COMPONENT, e))
    };

    let public = (0..zones).map(&block).collect::<Result<Vec<_>>>()?;
    let private = (zones..zones * 2).map(&block).collect::<Result<Vec<_>>>()?;
    Ok((public, private))
}

pub fn declare(graph: &mut ResourceGraph, name: &str, args: &NetworkArgs) -> Result<NetworkOutputs> {
    let (public_blocks, private_blocks) = carve_subnets(&args.base_cidr, args.availability_zones.len())?;
    let base = &args.base_tags;

    let root = graph.component(name, COMPONENT, None)?;

    let vpc = graph.declare(
        ResourceSpec::new(format!("{name}-vpc"), "aws:ec2/vpc:Vpc")
            .parent(&root)
            .properties(json!({
                "cidrBlock": args.base_cidr.to_string(),
                "enableDnsHostnames": true,
                "enableDnsSupport": true,
                "tags": tags(base, &[("Name", args.description.as_str())]),
            })),
    )?;

    let igw = graph.declare(
        ResourceSpec::new(format!("{name}-igw"), "aws:ec2/internetGateway:InternetGateway")
            .parent(&vpc)
            .prop("vpcId", vpc.id())
            .prop("tags", tags(base, &[("Name", format!("{name}-igw").as_str())])),
    )?;

    let public_rt = graph.declare(
        ResourceSpec::new(format!("{name}-public-rt"), "aws:ec2/routeTable:RouteTable")
            .parent(&vpc)
            .prop("vpcId", vpc.id())
            .prop("tags", tags(base, &[("Name", format!("{name}-public").as_str())])),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-public-default-route"), "aws:ec2/route:Route")
            .parent(&public_rt)
            .prop("routeTableId", public_rt.id())
            .prop("destinationCidrBlock", "0.0.0.0/0")
            .prop("gatewayId", igw.id()),
    )?;

    let mut public_subnet_ids = Vec::new();
    let mut private_subnet_ids = Vec::new();
    let mut nat_gateway_ips = Vec::new();
    let mut route_tables = vec![public_rt.id()];

    for (i, zone) in args.availability_zones.iter().enumerate() {
        let public = graph.declare(
            ResourceSpec::new(format!("{name}-public-{i}"), "aws:ec2/subnet:Subnet")
                .parent(&vpc)
                .properties(json!({
                    "vpcId": vpc.id(),
                    "cidrBlock": public_blocks[i].to_string(),
                    "availabilityZone": zone,
                    "mapPublicIpOnLaunch": true,
                    "tags": tags(base, &[("Name", format!("{name}-public-{zone}").as_str()), ("Tier", "public")]),
                })),
        )?;
        graph.declare(
            ResourceSpec::new(
                format!("{name}-public-{i}-rta"),
                "aws:ec2/routeTableAssociation:RouteTableAssociation",
            )
            .parent(&public)
            .prop("subnetId", public.id())
            .prop("routeTableId", public_rt.id()),
        )?;

        let eip = graph.declare(
            ResourceSpec::new(format!("{name}-nat-eip-{i}"), "aws:ec2/eip:Eip")
                .parent(&vpc)
                .prop("domain", "vpc")
                .prop("tags", tags(base, &[("Name", format!("{name}-nat-{zone}").as_str())])),
        )?;
        let nat = graph.declare(
            ResourceSpec::new(format!("{name}-nat-{i}"), "aws:ec2/natGateway:NatGateway")
                .parent(&public)
                .depends_on(&igw)
                .prop("allocationId", eip.id())
                .prop("subnetId", public.id())
                .prop("tags", tags(base, &[("Name", format!("{name}-nat-{zone}").as_str())])),
        )?;

        let private = graph.declare(
            ResourceSpec::new(format!("{name}-private-{i}"), "aws:ec2/subnet:Subnet")
                .parent(&vpc)
                .properties(json!({
                    "vpcId": vpc.id(),
                    "cidrBlock": private_blocks[i].to_string(),
                    "availabilityZone": zone,
                    "mapPublicIpOnLaunch": false,
                    "tags": tags(base, &[("Name", format!("{name}-private-{zone}").as_str()), ("Tier", "private")]),
                })),
        )?;
        let private_rt = graph.declare(
            ResourceSpec::new(format!("{name}-private-rt-{i}"), "aws:ec2/routeTable:RouteTable")
                .parent(&vpc)
                .prop("vpcId", vpc.id())
                .prop("tags", tags(base, &[("Name", format!("{name}-private-{zone}").as_str())])),
        )?;
        graph.declare(
            ResourceSpec::new(format!("{name}-private-{i}-default-route"), "aws:ec2/route:Route")
                .parent(&private_rt)
                .prop("routeTableId", private_rt.id())
                .prop("destinationCidrBlock", "0.0.0.0/0")
                .prop("natGatewayId", nat.id()),
        )?;
        graph.declare(
            ResourceSpec::new(
                format!("{name}-private-{i}-rta"),
                "aws:ec2/routeTableAssociation:RouteTableAssociation",
            )
            .parent(&private)
            .prop("subnetId", private.id())
            .prop("routeTableId", private_rt.id()),
        )?;

        public_subnet_ids.push(public.id());
        private_subnet_ids.push(private.id());
        nat_gateway_ips.push(eip.attr("publicIp"));
        route_tables.push(private_rt.id());
    }

    if args.create_s3_endpoint {
        let region = graph.lookup(
            ResourceSpec::new(format!("{name}-region"), "aws:index/getRegion:getRegion").parent(&root),
        )?;
        graph.declare(
            ResourceSpec::new(format!("{name}-s3-endpoint"), "aws:ec2/vpcEndpoint:VpcEndpoint")
                .parent(&vpc)
                .prop("vpcId", vpc.id())
                .prop(
                    "serviceName",
                    Output::<String>::format(vec![lit("com.amazonaws."), region.attr("name"), lit(".s3")]),
                )
                .prop("vpcEndpointType", "Gateway")
                .prop("routeTableIds", output_list(&route_tables))
                .prop("tags", tags(base, &[("Name", format!("{name}-s3").as_str())])),
        )?;
    }

    if let Some(traffic) = args.flow_log_traffic {
        declare_flow_logs(graph, name, &vpc, traffic, base)?;
    }

    let outputs = NetworkOutputs {
        vpc_id: vpc.id(),
        vpc_cidr: lit(args.base_cidr.to_string()),
        vpc,
        public_subnet_ids,
        private_subnet_ids,
        nat_gateway_ips,
    };
    Ok(outputs)
}

/// Flow logs delivered to a CloudWatch log group
fn declare_flow_logs(
    graph: &mut ResourceGraph,
    name: &str,
    vpc: &ResourceHandle,
    traffic: FlowLogTraffic,
    base: &IndexMap<String, String>,
) -> Result<()> {
    let log_group = graph.declare(
        ResourceSpec::new(format!("{name}-flow-logs-group"), "aws:cloudwatch/logGroup:LogGroup")
            .parent(vpc)
            .prop("name", format!("{name}-flow-logs"))
            .prop("tags", tags(base, &[])),
    )?;

    let role = graph.declare(
        ResourceSpec::new(format!("{name}-flow-logs-role"), types::ROLE)
            .parent(vpc)
            .prop("assumeRolePolicy", assume_role_policy("vpc-flow-logs.amazonaws.com"))
            .prop("tags", tags(base, &[])),
    )?;

    let policy = PolicyDocument::new().statement(
        Statement::allow([
            "logs:CreateLogGroup",
            "logs:CreateLogStream",
            "logs:PutLogEvents",
            "logs:DescribeLogGroups",
            "logs:DescribeLogStreams",
        ])
        .resource(lit("*")),
    );
    graph.declare(
        ResourceSpec::new(format!("{name}-flow-logs-policy"), types::ROLE_POLICY)
            .parent(&role)
            .prop("role", role.id())
            .prop("policy", policy.to_json_string()),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-flow-logs"), "aws:ec2/flowLog:FlowLog")
            .parent(vpc)
            .prop("vpcId", vpc.id())
            .prop("trafficType", traffic.as_str())
            .prop("logDestination", log_group.arn())
            .prop("iamRoleArn", role.arn())
            .prop("tags", tags(base, &[])),
    )?;
    Ok(())
}
