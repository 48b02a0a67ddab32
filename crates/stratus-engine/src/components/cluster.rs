//! EKS cluster with a self-managed worker autoscaling group
//!
//! Besides the control plane this declares the public application load
//! balancer that fronts the ingress controller's node ports, and the IAM
//! wiring for the cluster autoscaler.

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use stratus_core::{Output, lit};

use super::{egress_all, output_list, sg_rule, tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceSpec};
use crate::policy::{PolicyDocument, Statement, assume_role_policy, web_identity_trust};

const COMPONENT: &str = "stratus:components:Cluster";

/// Node port of the ingress controller's admin entry point (health checks)
pub const INGRESS_ADMIN_NODE_PORT: u16 = 30900;
/// Node port of the ingress controller's web entry point
pub const INGRESS_WEB_NODE_PORT: u16 = 32080;

const CLUSTER_POLICIES: &[(&str, &str)] = &[
    ("service", "arn:aws:iam::aws:policy/AmazonEKSServicePolicy"),
    ("cluster", "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy"),
];

const WORKER_POLICIES: &[(&str, &str)] = &[
    ("workernode", "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy"),
    ("cni", "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy"),
    ("container-ro", "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly"),
    ("ebs-csi", "arn:aws:iam::aws:policy/service-role/AmazonEBSCSIDriverPolicy"),
    ("ssm-session", "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore"),
];

const CLUSTER_LOG_TYPES: &[&str] = &["api", "audit", "authenticator", "controllerManager", "scheduler"];

const AUTOSCALER_ACTIONS: &[&str] = &[
    "autoscaling:DescribeAutoScalingGroups",
    "autoscaling:DescribeAutoScalingInstances",
    "autoscaling:DescribeLaunchConfigurations",
    "autoscaling:DescribeTags",
    "autoscaling:SetDesiredCapacity",
    "autoscaling:TerminateInstanceInAutoScalingGroup",
    "ec2:DescribeLaunchTemplateVersions",
];

const AUTOSCALER_NAMESPACE: &str = "kube-system";
const AUTOSCALER_SERVICE_ACCOUNT: &str = "cluster-autoscaler";

/// Internal range allowed to reach nodes over ssh and node ports
const INTERNAL_CIDR: &str = "10.0.0.0/8";

#[derive(Debug, Clone)]
pub struct ClusterArgs {
    pub vpc_id: Output<String>,
    pub public_subnet_ids: Vec<Output<String>>,
    pub private_subnet_ids: Vec<Output<String>>,
    /// Default certificate of the HTTPS listener
    pub certificate_arn: Output<String>,
    pub eks_version: String,
    pub worker_image_id: String,
    pub worker_instance_type: String,
    pub worker_key_name: String,
    pub worker_min_size: u32,
    pub worker_max_size: u32,
    pub public_endpoint: bool,
    pub private_endpoint: bool,
    pub base_tags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ClusterOutputs {
    pub cluster: ResourceHandle,
    pub cluster_name: String,
    pub issuer: Output<String>,
    pub openid_connector_arn: Output<String>,
    pub worker_role_arn: Output<String>,
    pub public_load_balancer: Output<String>,
}

/// Worker user data script joining the node to the cluster
pub fn bootstrap_script(endpoint: Output<String>, ca: Output<String>, cluster_name: &str) -> Output<String> {
    Output::<String>::format(vec![
        lit("#!/bin/bash\nset -o xtrace\n/etc/eks/bootstrap.sh --apiserver-endpoint '"),
        endpoint,
        lit(
            "' --kubelet-extra-args --node-labels=node.kubernetes.io/lifecycle=`curl -s \
             http://169.254.169.254/latest/meta-data/instance-life-cycle` --b64-cluster-ca '",
        ),
        ca,
        lit(format!("' '{cluster_name}'\n")),
    ])
}

fn asg_tag(key: &str, value: &str) -> JsonValue {
    json!({ "key": key, "value": value, "propagateAtLaunch": true })
}

pub fn declare(graph: &mut ResourceGraph, name: &str, args: &ClusterArgs) -> Result<ClusterOutputs> {
    let base = &args.base_tags;
    let cluster_name = format!("{name}-eks-cluster");
    let root = graph.component(name, COMPONENT, None)?;

    // IAM
    let cluster_role = graph.declare(
        ResourceSpec::new(format!("{name}-eks-iam-role"), types::ROLE)
            .parent(&root)
            .prop("assumeRolePolicy", assume_role_policy("eks.amazonaws.com"))
            .prop("tags", tags(base, &[])),
    )?;
    for (short, policy_arn) in CLUSTER_POLICIES {
        graph.declare(
            ResourceSpec::new(format!("{name}-eks-{short}-policy-attachment"), types::ROLE_POLICY_ATTACHMENT)
                .parent(&cluster_role)
                .prop("role", cluster_role.id())
                .prop("policyArn", policy_arn),
        )?;
    }

    let worker_role = graph.declare(
        ResourceSpec::new(format!("{name}-ec2-nodegroup-iam-role"), types::ROLE)
            .parent(&root)
            .prop("assumeRolePolicy", assume_role_policy("ec2.amazonaws.com"))
            .prop("tags", tags(base, &[])),
    )?;
    for (short, policy_arn) in WORKER_POLICIES {
        graph.declare(
            ResourceSpec::new(format!("{name}-{short}-policy-attachment"), types::ROLE_POLICY_ATTACHMENT)
                .parent(&worker_role)
                .prop("role", worker_role.id())
                .prop("policyArn", policy_arn),
        )?;
    }

    // Control plane
    let cluster_sg = graph.declare(
        ResourceSpec::new(format!("{name}-eks-cluster-sg"), types::SECURITY_GROUP)
            .parent(&root)
            .properties(json!({
                "vpcId": args.vpc_id,
                "description": "Allow all HTTP(s) traffic to EKS Cluster",
                "ingress": [
                    sg_rule("tcp", 443, 443, &["0.0.0.0/0"]),
                    sg_rule("tcp", 80, 80, &["0.0.0.0/0"]),
                ],
                "tags": tags(base, &[("Name", "eks-cluster-sg")]),
            })),
    )?;

    let cluster = graph.declare(
        ResourceSpec::new(format!("{name}-eks-cluster"), "aws:eks/cluster:Cluster")
            .parent(&root)
            .properties(json!({
                "name": cluster_name,
                "version": args.eks_version,
                "roleArn": cluster_role.arn(),
                "enabledClusterLogTypes": CLUSTER_LOG_TYPES,
                "vpcConfig": {
                    "publicAccessCidrs": ["0.0.0.0/0"],
                    "endpointPrivateAccess": args.private_endpoint,
                    "endpointPublicAccess": args.public_endpoint,
                    "securityGroupIds": [cluster_sg.id()],
                    "subnetIds": output_list(&args.private_subnet_ids),
                },
                "tags": tags(base, &[("Name", cluster_name.as_str())]),
            })),
    )?;
    let issuer: Output<String> = cluster.attr("identities[0].oidcs[0].issuer");

    let issuer_certificate = graph.lookup(
        ResourceSpec::new(format!("{name}-oidc-certificate"), "tls:index/getCertificate:getCertificate")
            .parent(&cluster)
            .prop("url", &issuer),
    )?;
    let oidc = graph.declare(
        ResourceSpec::new(format!("{name}-oidc-provider"), "aws:iam/openIdConnectProvider:OpenIdConnectProvider")
            .parent(&cluster)
            .properties(json!({
                "clientIdLists": ["sts.amazonaws.com"],
                "thumbprintLists": [issuer_certificate.attr::<String>("certificates[0].sha1Fingerprint")],
                "url": issuer,
                "tags": tags(base, &[]),
            })),
    )?;

    // Public load balancer
    let alb_sg = graph.declare(
        ResourceSpec::new(format!("{name}-alb-sec-grp"), types::SECURITY_GROUP)
            .parent(&root)
            .properties(json!({
                "vpcId": args.vpc_id,
                "description": "Security group for the EKS load balancer",
                "ingress": [
                    sg_rule("tcp", 80, 80, &["0.0.0.0/0"]),
                    sg_rule("tcp", 443, 443, &["0.0.0.0/0"]),
                ],
                "egress": [egress_all()],
                "tags": tags(base, &[("Name", "eks-alb-sg")]),
            })),
    )?;
    let alb = graph.declare(
        ResourceSpec::new(format!("{name}-eks-lb"), "aws:lb/loadBalancer:LoadBalancer")
            .parent(&root)
            .properties(json!({
                "loadBalancerType": "application",
                "securityGroups": [alb_sg.id()],
                "subnets": output_list(&args.public_subnet_ids),
                "tags": tags(base, &[]),
            })),
    )?;
    let target_group = graph.declare(
        ResourceSpec::new(format!("{name}-eks-lb-tg"), "aws:lb/targetGroup:TargetGroup")
            .parent(&alb)
            .properties(json!({
                "healthCheck": {
                    "path": "/ping",
                    "port": INGRESS_ADMIN_NODE_PORT.to_string(),
                    "interval": 30,
                },
                "port": INGRESS_WEB_NODE_PORT,
                "protocol": "HTTP",
                "vpcId": args.vpc_id,
            })),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-eks-lb-http-listener"), "aws:lb/listener:Listener")
            .parent(&alb)
            .properties(json!({
                "loadBalancerArn": alb.arn(),
                "port": 80,
                "protocol": "HTTP",
                "defaultActions": [{
                    "type": "redirect",
                    "redirect": { "port": "443", "protocol": "HTTPS", "statusCode": "HTTP_301" },
                }],
            })),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-eks-lb-https-listener"), "aws:lb/listener:Listener")
            .parent(&alb)
            .properties(json!({
                "loadBalancerArn": alb.arn(),
                "port": 443,
                "protocol": "HTTPS",
                "sslPolicy": "ELBSecurityPolicy-2016-08",
                "certificateArn": args.certificate_arn,
                "defaultActions": [{ "type": "forward", "targetGroupArn": target_group.arn() }],
            })),
    )?;

    // Workers
    let node_sg = graph.declare(
        ResourceSpec::new(format!("{name}-node-sec-grp"), types::SECURITY_GROUP)
            .parent(&root)
            .properties(json!({
                "vpcId": args.vpc_id,
                "description": "Security group for EKS Cluster nodes",
                "egress": [egress_all()],
                "tags": tags(base, &[("Name", "eks-cluster-node-sg")]),
            })),
    )?;
    let node_rules = [
        ("self", "-1", 0, 0, Some(node_sg.id()), None, "Allow node to communicate with each other"),
        (
            "cluster",
            "-1",
            0,
            0,
            Some(cluster_sg.id()),
            None,
            "Allow worker Kubelets and pods to receive communication from the cluster control plane",
        ),
        ("ssh", "tcp", 22, 22, None, Some(INTERNAL_CIDR), "Allow ssh from vpc"),
        ("app", "tcp", 30000, 32800, None, Some(INTERNAL_CIDR), "Allow app access from vpc"),
    ];
    for (short, protocol, from, to, source_sg, cidr, description) in node_rules {
        let mut spec = ResourceSpec::new(format!("{name}-node-sec-grp-{short}"), "aws:ec2/securityGroupRule:SecurityGroupRule")
            .parent(&node_sg)
            .prop("type", "ingress")
            .prop("protocol", protocol)
            .prop("fromPort", from)
            .prop("toPort", to)
            .prop("securityGroupId", node_sg.id())
            .prop("description", description);
        if let Some(source) = source_sg {
            spec = spec.prop("sourceSecurityGroupId", source);
        }
        if let Some(cidr) = cidr {
            spec = spec.prop("cidrBlocks", [cidr]);
        }
        graph.declare(spec)?;
    }

    let instance_profile = graph.declare(
        ResourceSpec::new(format!("{name}-node-instance-profile"), "aws:iam/instanceProfile:InstanceProfile")
            .parent(&root)
            .prop("role", worker_role.attr::<String>("name")),
    )?;

    let user_data = bootstrap_script(
        cluster.attr("endpoint"),
        cluster.attr("certificateAuthority.data"),
        &cluster_name,
    )
    .base64();
    let launch_template = graph.declare(
        ResourceSpec::new(format!("{name}-node-launch-template"), "aws:ec2/launchTemplate:LaunchTemplate")
            .parent(&root)
            .properties(json!({
                "iamInstanceProfile": { "arn": instance_profile.arn() },
                "imageId": args.worker_image_id,
                "instanceType": args.worker_instance_type,
                "keyName": args.worker_key_name,
                "namePrefix": cluster_name,
                "networkInterfaces": [{
                    "associatePublicIpAddress": false,
                    "securityGroups": [node_sg.id()],
                }],
                "blockDeviceMappings": [{
                    "deviceName": "/dev/xvda",
                    "ebs": {
                        "deleteOnTermination": true,
                        "volumeSize": 50,
                        "volumeType": "gp2",
                    },
                }],
                "userData": user_data,
                "tags": tags(base, &[]),
            })),
    )?;

    let mut asg_tags = vec![
        asg_tag("Name", &format!("{cluster_name}-worker-node")),
        asg_tag(&format!("kubernetes.io/cluster/{cluster_name}"), "owned"),
        asg_tag(&format!("k8s.io/cluster-autoscaler/{cluster_name}"), "owned"),
        asg_tag("k8s.io/cluster-autoscaler/enabled", "true"),
    ];
    asg_tags.extend(base.iter().map(|(k, v)| asg_tag(k, v)));

    let asg = graph.declare(
        ResourceSpec::new(format!("{name}-node-asg"), "aws:autoscaling/group:Group")
            .parent(&root)
            .properties(json!({
                "name": format!("{cluster_name}-worker-node-asg"),
                "instanceRefresh": { "strategy": "Rolling" },
                "launchTemplate": { "id": launch_template.id(), "version": "$Latest" },
                "minSize": args.worker_min_size,
                "maxSize": args.worker_max_size,
                "vpcZoneIdentifiers": output_list(&args.private_subnet_ids),
                "targetGroupArns": [target_group.arn()],
                "tags": asg_tags,
            })),
    )?;

    // Cluster autoscaler
    let autoscaler_policy = graph.declare(
        ResourceSpec::new(format!("{name}-eks-autoscaler-policy"), types::POLICY)
            .parent(&root)
            .prop(
                "policy",
                PolicyDocument::new()
                    .statement(Statement::allow(AUTOSCALER_ACTIONS.iter().copied()).resource(lit("*")))
                    .to_json_string(),
            )
            .prop("tags", tags(base, &[])),
    )?;
    let oidc_arn: Output<String> = oidc.arn();
    let trust = web_identity_trust(
        oidc_arn.clone(),
        oidc_arn.after("/"),
        AUTOSCALER_NAMESPACE,
        AUTOSCALER_SERVICE_ACCOUNT,
    );
    let autoscaler_role = graph.declare(
        ResourceSpec::new(format!("{name}-eks-autoscaler-role"), types::ROLE)
            .parent(&root)
            .prop("assumeRolePolicy", trust.to_json_string())
            .prop("tags", tags(base, &[])),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-eks-autoscaler-attach"), types::ROLE_POLICY_ATTACHMENT)
            .parent(&autoscaler_role)
            .prop("role", autoscaler_role.attr::<String>("name"))
            .prop("policyArn", autoscaler_policy.arn()),
    )?;

    let scaling_policy = graph.declare(
        ResourceSpec::new(format!("{name}-asg-policy"), "aws:autoscaling/policy:Policy")
            .parent(&asg)
            .properties(json!({
                "scalingAdjustment": 2,
                "adjustmentType": "ChangeInCapacity",
                "cooldown": 300,
                "autoscalingGroupName": asg.attr::<String>("name"),
            })),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-eks-cpu-alarm"), "aws:cloudwatch/metricAlarm:MetricAlarm")
            .parent(&asg)
            .properties(json!({
                "comparisonOperator": "GreaterThanOrEqualToThreshold",
                "evaluationPeriods": 2,
                "metricName": "CPUUtilization",
                "namespace": "AWS/EC2",
                "period": 300,
                "statistic": "Average",
                "threshold": 60,
                "alarmActions": [scaling_policy.arn()],
                "dimensions": { "AutoScalingGroupName": asg.attr::<String>("name") },
            })),
    )?;

    Ok(ClusterOutputs {
        issuer,
        openid_connector_arn: oidc.arn(),
        worker_role_arn: worker_role.arn(),
        public_load_balancer: alb.attr("dnsName"),
        cluster_name,
        cluster,
    })
}
