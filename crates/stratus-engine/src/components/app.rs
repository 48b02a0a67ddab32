//! Containerized application: workload identity, manifests, routing and DNS

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use stratus_core::{Hostname, Output};

use super::{tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceSpec};
use crate::kube::{self, DeploymentArgs};
use crate::policy::{PolicyDocument, web_identity_trust};

const COMPONENT: &str = "stratus:components:App";

const RECORD_TTL: u32 = 300;

/// Environment keys of the default database secrets
pub const DB_USERNAME_KEY: &str = "DB_USERNAME";
pub const DB_PASSWORD_KEY: &str = "DB_PASSWORD";

#[derive(Debug, Clone)]
pub struct AppArgs {
    /// Container name
    pub app_name: String,
    /// Name of the deployment, service account, secret and service
    pub service_name: String,
    pub namespace: String,
    pub image: String,
    pub container_ports: Vec<u16>,
    pub ingress_port: u16,
    pub environment: IndexMap<String, String>,
    pub secrets: IndexMap<String, Output<String>>,
    pub hostnames: Vec<Hostname>,
    pub min_replicas: i32,
    pub max_replicas: i32,
    /// Extra IAM statements, kept verbatim
    pub service_permissions: Vec<JsonValue>,
    pub issuer: Output<String>,
    pub openid_connector_arn: Output<String>,
    pub public_load_balancer: Output<String>,
    pub zone_name: String,
    pub base_tags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppOutputs {
    pub service_account: Output<String>,
    pub role_arn: Output<String>,
}

/// Database credentials overlaid by configured secrets
///
/// Configured keys win over the defaults.
pub fn secret_data(
    db_username: Output<String>,
    db_password: Output<String>,
    overrides: &IndexMap<String, String>,
) -> IndexMap<String, Output<String>> {
    let mut data = IndexMap::from([
        (DB_USERNAME_KEY.to_string(), db_username),
        (DB_PASSWORD_KEY.to_string(), db_password),
    ]);
    for (key, value) in overrides {
        data.insert(key.clone(), Output::secret(value.clone()));
    }
    data
}

pub fn declare(graph: &mut ResourceGraph, name: &str, args: &AppArgs) -> Result<AppOutputs> {
    let root = graph.component(name, COMPONENT, None)?;
    let service = args.service_name.as_str();
    let namespace = args.namespace.as_str();
    let labels = kube::app_labels(service);

    let ns = graph.declare(
        ResourceSpec::new(format!("{name}-ns"), types::K8S_NAMESPACE)
            .parent(&root)
            .properties(kube::namespace(namespace)?),
    )?;

    // Workload identity
    let policy = if args.service_permissions.is_empty() {
        None
    } else {
        let document = PolicyDocument::from_raw(&args.service_permissions);
        Some(graph.declare(
            ResourceSpec::new(format!("{name}-policy"), types::POLICY)
                .parent(&root)
                .prop("policy", document.to_json_string())
                .prop("tags", tags(&args.base_tags, &[])),
        )?)
    };

    let trust = web_identity_trust(
        args.openid_connector_arn.clone(),
        args.issuer.trim_prefix("https://"),
        namespace,
        service,
    );
    let role = graph.declare(
        ResourceSpec::new(format!("{name}-role"), types::ROLE)
            .parent(&root)
            .prop("name", format!("{name}-role"))
            .prop("assumeRolePolicy", trust.to_json_string())
            .prop("tags", tags(&args.base_tags, &[])),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-sa"), "kubernetes:core/v1:ServiceAccount")
            .parent(&root)
            .depends_on(&ns)
            .properties(kube::service_account(service, namespace, &labels, &role.arn())?),
    )?;

    if let Some(policy) = &policy {
        graph.declare(
            ResourceSpec::new(format!("{name}-roleattach"), types::ROLE_POLICY_ATTACHMENT)
                .parent(&root)
                .prop("role", role.attr::<String>("name"))
                .prop("policyArn", policy.arn()),
        )?;
    }

    // Manifests
    let secret_entries: Vec<(String, Output<String>)> = args
        .secrets
        .iter()
        .map(|(key, value)| (key.clone(), value.clone().into_secret()))
        .collect();
    let secret = graph.declare(
        ResourceSpec::new(format!("{name}-secrets"), "kubernetes:core/v1:Secret")
            .parent(&root)
            .depends_on(&ns)
            .properties(kube::secret(service, namespace, &labels, &secret_entries)?),
    )?;

    let env: Vec<(String, String)> = args
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let deployment = graph.declare(
        ResourceSpec::new(format!("{name}-deployment"), "kubernetes:apps/v1:Deployment")
            .parent(&root)
            .depends_on(&ns)
            .depends_on(&secret)
            .properties(kube::deployment(&DeploymentArgs {
                name: service,
                namespace,
                container_name: &args.app_name,
                image: &args.image,
                labels: &labels,
                env: &env,
                env_secret: Some(service),
                ports: &args.container_ports,
                service_account: service,
            })?),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-app-hpa"), "kubernetes:autoscaling/v2:HorizontalPodAutoscaler")
            .parent(&root)
            .depends_on(&deployment)
            .properties(kube::horizontal_pod_autoscaler(
                service,
                namespace,
                &labels,
                service,
                args.min_replicas,
                args.max_replicas,
            )?),
    )?;

    let k8s_service = graph.declare(
        ResourceSpec::new(format!("{name}-service"), "kubernetes:core/v1:Service")
            .parent(&root)
            .depends_on(&ns)
            .properties(kube::service(service, namespace, &labels, &args.container_ports)?),
    )?;

    // Routing
    if !args.hostnames.is_empty() {
        let hosts: Vec<&str> = args.hostnames.iter().map(|h| h.name.as_str()).collect();
        graph.declare(
            ResourceSpec::new(format!("{name}-ing"), "kubernetes:traefik.containo.us/v1alpha1:IngressRoute")
                .parent(&root)
                .depends_on(&k8s_service)
                .properties(kube::ingress_route(service, namespace, &hosts, service, args.ingress_port)),
        )?;
    }

    if args.hostnames.iter().any(|h| h.create_record) {
        let zone = graph.lookup(
            ResourceSpec::new(format!("{name}-zone"), types::GET_ZONE)
                .parent(&root)
                .prop("name", &args.zone_name),
        )?;
        for (i, host) in args.hostnames.iter().enumerate() {
            if !host.create_record {
                continue;
            }
            graph.declare(
                ResourceSpec::new(format!("{name}-record{i}"), types::RECORD)
                    .parent(&root)
                    .properties(json!({
                        "zoneId": zone.attr::<String>("zoneId"),
                        "name": host.name,
                        "type": "CNAME",
                        "ttl": RECORD_TTL,
                        "records": [args.public_load_balancer],
                    })),
            )?;
        }
    }

    Ok(AppOutputs {
        service_account: Output::known(service.to_string()),
        role_arn: role.arn(),
    })
}
