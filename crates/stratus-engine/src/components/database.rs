//! Aurora MySQL serverless v2 cluster behind a connection proxy

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use stratus_core::config::SUPPORTED_DB_VERSIONS;
use stratus_core::{Function, Ipv4Cidr, Output, lit};

use super::{declaration_error, egress_all, output_list, sg_rule, tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceSpec};
use crate::policy::{PolicyDocument, Statement, assume_role_policy};

const COMPONENT: &str = "stratus:components:Database";

/// Admin user of the cluster, also used by the proxy
pub const ADMIN_USERNAME: &str = "root";

const CA_CERTIFICATE_ID: &str = "rds-ca-rsa2048-g1";
const RECORD_TTL: u32 = 300;

const SECRET_ACTIONS: &[&str] = &[
    "secretsmanager:GetRandomPassword",
    "secretsmanager:CreateSecret",
    "secretsmanager:ListSecrets",
    "secretsmanager:GetSecretValue",
];

#[derive(Debug, Clone)]
pub struct DatabaseArgs {
    pub vpc_id: Output<String>,
    pub private_subnet_ids: Vec<Output<String>>,
    /// Client ranges allowed on 3306
    pub cidr_blocks: Vec<Ipv4Cidr>,
    pub major_version: String,
    /// Full engine version, e.g. `8.0.mysql_aurora.3.06.0`
    pub engine_version: String,
    pub database_name: String,
    pub storage_size: u32,
    pub is_prod_database: bool,
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub zone_name: String,
    pub base_tags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseOutputs {
    pub cluster: ResourceHandle,
    pub admin_username: Output<String>,
    /// Secret
    pub admin_password: Output<String>,
    pub endpoint: Output<String>,
    pub proxy_endpoint: Output<String>,
    pub proxy_username: Output<String>,
    /// Secret
    pub proxy_password: Output<String>,
}

pub fn declare(graph: &mut ResourceGraph, name: &str, args: &DatabaseArgs) -> Result<DatabaseOutputs> {
    if !SUPPORTED_DB_VERSIONS.iter().any(|(major, _)| *major == args.major_version) {
        return Err(declaration_error(
            COMPONENT,
            format!("unsupported database version '{}'", args.major_version),
        ));
    }
    let base = &args.base_tags;
    let root = graph.component(name, COMPONENT, None)?;

    let zone = graph.lookup(
        ResourceSpec::new(format!("{name}-zone"), types::GET_ZONE)
            .parent(&root)
            .prop("name", &args.zone_name),
    )?;
    let ca_certificate = graph.lookup(
        ResourceSpec::new(format!("{name}-db-ca-certificate"), "aws:rds/getCertificate:getCertificate")
            .parent(&root)
            .prop("id", CA_CERTIFICATE_ID),
    )?;

    for (major, _) in SUPPORTED_DB_VERSIONS {
        graph.declare(
            ResourceSpec::new(format!("{name}-db-mysql-{major}"), "aws:rds/parameterGroup:ParameterGroup")
                .parent(&root)
                .prop("family", format!("aurora-mysql{major}"))
                .prop("name", format!("mysql{}", major.replace('.', "")))
                .prop("tags", tags(base, &[])),
        )?;
    }

    let subnet_group = graph.declare(
        ResourceSpec::new(format!("{name}-db-subnet"), "aws:rds/subnetGroup:SubnetGroup")
            .parent(&root)
            .prop("description", "Mysql db subnet")
            .prop("subnetIds", output_list(&args.private_subnet_ids))
            .prop("tags", tags(base, &[])),
    )?;

    let cidrs: Vec<String> = args.cidr_blocks.iter().map(ToString::to_string).collect();
    let cidr_refs: Vec<&str> = cidrs.iter().map(String::as_str).collect();
    let security_group = graph.declare(
        ResourceSpec::new(format!("{name}-db-security-group"), types::SECURITY_GROUP)
            .parent(&root)
            .properties(json!({
                "description": "main db access",
                "vpcId": args.vpc_id,
                "ingress": [sg_rule("tcp", 3306, 3306, &cidr_refs)],
                "egress": [egress_all()],
                "tags": tags(base, &[]),
            })),
    )?;

    let password = graph.declare(
        ResourceSpec::new(format!("{name}-db-mysql-password"), "random:index/randomPassword:RandomPassword")
            .parent(&root)
            .prop("length", 32)
            .prop("special", false)
            .secret_outputs(&["result"]),
    )?;
    let admin_password: Output<String> = password.attr("result");

    let mut cluster_props = json!({
        "applyImmediately": true,
        "allowMajorVersionUpgrade": true,
        "clusterIdentifierPrefix": format!("{name}-db-cluster"),
        "databaseName": args.database_name,
        "dbSubnetGroupName": subnet_group.attr::<String>("name"),
        "engine": "aurora-mysql",
        "engineMode": "provisioned",
        "engineVersion": args.engine_version,
        "allocatedStorage": args.storage_size,
        "masterUsername": ADMIN_USERNAME,
        "masterPassword": admin_password,
        "skipFinalSnapshot": !args.is_prod_database,
        "serverlessv2ScalingConfiguration": {
            "minCapacity": args.min_capacity,
            "maxCapacity": args.max_capacity,
        },
        "vpcSecurityGroupIds": [security_group.id()],
        "storageEncrypted": true,
        "tags": tags(base, &[]),
    });
    if args.is_prod_database {
        cluster_props["finalSnapshotIdentifier"] = JsonValue::String(format!("{name}-db-cluster"));
    }
    let cluster = graph.declare(
        ResourceSpec::new(format!("{name}-db-cluster"), "aws:rds/cluster:Cluster")
            .parent(&root)
            .properties(cluster_props),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-db-instance"), "aws:rds/clusterInstance:ClusterInstance")
            .parent(&cluster)
            .properties(json!({
                "applyImmediately": true,
                "caCertIdentifier": ca_certificate.id(),
                "clusterIdentifier": cluster.id(),
                "instanceClass": "db.serverless",
                "engine": cluster.attr::<String>("engine"),
                "engineVersion": cluster.attr::<String>("engineVersion"),
                "tags": tags(base, &[]),
            })),
    )?;

    // Proxy
    let proxy_secret = graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-secret"), "aws:secretsmanager/secret:Secret")
            .parent(&root)
            .prop("description", "Secret for the RDS proxy")
            .prop("tags", tags(base, &[])),
    )?;
    let credentials = Output::<JsonValue>::json_object(vec![
        ("username", Output::known(json!(ADMIN_USERNAME))),
        ("password", admin_password.erase()),
    ]);
    graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-secret-version"), "aws:secretsmanager/secretVersion:SecretVersion")
            .parent(&proxy_secret)
            .prop("secretId", proxy_secret.id())
            .prop("secretString", Output::<JsonValue>::call(Function::JsonEncode, vec![credentials])),
    )?;

    let secret_access = PolicyDocument::new()
        .statement(Statement::allow(SECRET_ACTIONS.iter().copied()).resource(proxy_secret.arn()))
        .statement(Statement::allow(["kms:Decrypt"]).resource(lit("*")));
    let proxy_role = graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-role"), types::ROLE)
            .parent(&root)
            .properties(json!({
                "name": format!("{name}-db-proxy-role"),
                "assumeRolePolicy": assume_role_policy("rds.amazonaws.com"),
                "inlinePolicies": [{
                    "name": "SecretManagerAccess",
                    "policy": secret_access.to_json_string(),
                }],
            })),
    )?;

    let proxy = graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy"), "aws:rds/proxy:Proxy")
            .parent(&root)
            .properties(json!({
                "name": format!("{name}-db-proxy"),
                "debugLogging": true,
                "engineFamily": "MYSQL",
                "idleClientTimeout": 1800,
                "requireTls": false,
                "roleArn": proxy_role.arn(),
                "vpcSecurityGroupIds": [security_group.id()],
                "vpcSubnetIds": output_list(&args.private_subnet_ids),
                "auths": [{
                    "authScheme": "SECRETS",
                    "description": "db-creds",
                    "iamAuth": "DISABLED",
                    "secretArn": proxy_secret.arn(),
                }],
                "tags": tags(base, &[]),
            })),
    )?;
    let target_group = graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-default-target-group"), "aws:rds/proxyDefaultTargetGroup:ProxyDefaultTargetGroup")
            .parent(&proxy)
            .properties(json!({
                "dbProxyName": proxy.attr::<String>("name"),
                "connectionPoolConfig": {
                    "connectionBorrowTimeout": 120,
                    "maxConnectionsPercent": 100,
                    "maxIdleConnectionsPercent": 50,
                    "sessionPinningFilters": ["EXCLUDE_VARIABLE_SETS"],
                },
            })),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-target-group"), "aws:rds/proxyTarget:ProxyTarget")
            .parent(&proxy)
            .properties(json!({
                "dbProxyName": proxy.attr::<String>("name"),
                "dbClusterIdentifier": cluster.attr::<String>("clusterIdentifier"),
                "targetGroupName": target_group.attr::<String>("name"),
            })),
    )?;
    let proxy_endpoint = graph.declare(
        ResourceSpec::new(format!("{name}-db-proxy-endpoint"), "aws:rds/proxyEndpoint:ProxyEndpoint")
            .parent(&proxy)
            .properties(json!({
                "dbProxyEndpointName": format!("{name}-db-proxy-endpoint"),
                "dbProxyName": proxy.attr::<String>("name"),
                "vpcSubnetIds": output_list(&args.private_subnet_ids),
                "vpcSecurityGroupIds": [security_group.id()],
                "targetRole": "READ_WRITE",
                "tags": tags(base, &[]),
            })),
    )?;

    // DNS
    let endpoint: Output<String> = cluster.attr("endpoint");
    let proxy_address: Output<String> = proxy_endpoint.attr("endpoint");
    for (short, record_name, target) in [("db", "db", &endpoint), ("db-proxy", "db-proxy", &proxy_address)] {
        graph.declare(
            ResourceSpec::new(format!("{name}-{short}-record"), types::RECORD)
                .parent(&root)
                .properties(json!({
                    "zoneId": zone.attr::<String>("zoneId"),
                    "name": record_name,
                    "type": "CNAME",
                    "ttl": RECORD_TTL,
                    "records": [target],
                })),
        )?;
    }

    Ok(DatabaseOutputs {
        cluster,
        admin_username: lit(ADMIN_USERNAME),
        proxy_username: lit(ADMIN_USERNAME),
        proxy_password: admin_password.clone(),
        admin_password,
        endpoint,
        proxy_endpoint: proxy_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{StackId, StackKind};

    fn args(prod: bool) -> DatabaseArgs {
        DatabaseArgs {
            vpc_id: lit("vpc-123"),
            private_subnet_ids: vec![lit("subnet-a"), lit("subnet-b")],
            cidr_blocks: vec!["10.0.0.0/16".parse().unwrap()],
            major_version: "8.0".to_string(),
            engine_version: "8.0.mysql_aurora.3.06.0".to_string(),
            database_name: "demoapp".to_string(),
            storage_size: 20,
            is_prod_database: prod,
            min_capacity: 2.0,
            max_capacity: 3.0,
            zone_name: "cloudlan.net".to_string(),
            base_tags: IndexMap::new(),
        }
    }

    fn declared(prod: bool) -> (ResourceGraph, DatabaseOutputs) {
        let mut g = ResourceGraph::new(StackId::new(StackKind::Database, "demo"));
        let out = declare(&mut g, "demo-db", &args(prod)).unwrap();
        (g, out)
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut a = args(false);
        a.major_version = "5.7".to_string();
        let mut g = ResourceGraph::new(StackId::new(StackKind::Database, "demo"));
        assert!(declare(&mut g, "demo-db", &a).unwrap_err().is_config_error());
    }

    #[test]
    fn test_production_keeps_final_snapshot() {
        let (g, _) = declared(true);
        let cluster = g.get("demo-db-db-cluster").unwrap();
        assert_eq!(cluster.properties["skipFinalSnapshot"], false);
        assert_eq!(cluster.properties["finalSnapshotIdentifier"], "demo-db-db-cluster");
    }

    #[test]
    fn test_non_production_skips_final_snapshot() {
        let (g, _) = declared(false);
        let cluster = g.get("demo-db-db-cluster").unwrap();
        assert_eq!(cluster.properties["skipFinalSnapshot"], true);
        assert!(cluster.properties.get("finalSnapshotIdentifier").is_none());
    }

    #[test]
    fn test_password_is_secret_everywhere() {
        let (g, out) = declared(false);
        assert!(out.admin_password.is_secret());
        assert!(out.proxy_password.is_secret());
        assert!(!out.admin_username.is_secret());

        let cluster = g.get("demo-db-db-cluster").unwrap();
        assert_eq!(
            cluster.properties["masterPassword"],
            json!({"$secret": {"$ref": "demo-db-db-mysql-password.result"}})
        );
        let version = g.get("demo-db-db-proxy-secret-version").unwrap();
        assert_eq!(version.properties["secretString"]["$secret"]["$fn"], "jsonencode");
    }

    #[test]
    fn test_records_and_graph() {
        let (g, out) = declared(false);
        assert_eq!(g.names_of_type(types::RECORD), vec!["demo-db-db-record", "demo-db-db-proxy-record"]);
        assert_eq!(g.get("demo-db-db-proxy-record").unwrap().properties["name"], "db-proxy");
        assert_eq!(out.endpoint.to_json(), json!({"$ref": "demo-db-db-cluster.endpoint"}));
        assert_eq!(g.mode("demo-db-db-ca-certificate"), Some(stratus_core::ResourceMode::Lookup));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_security_group_cidrs() {
        let (g, _) = declared(false);
        let sg = g.get("demo-db-db-security-group").unwrap();
        assert_eq!(sg.properties["ingress"][0]["fromPort"], 3306);
        assert_eq!(sg.properties["ingress"][0]["cidrBlocks"], json!(["10.0.0.0/16"]));
    }
}
