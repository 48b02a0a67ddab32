//! Shared in-cluster services: node authentication, metrics, storage driver,
//! ingress controller and the container registry

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use stratus_core::{Function, Output};

use super::cluster::{INGRESS_ADMIN_NODE_PORT, INGRESS_WEB_NODE_PORT};
use super::{tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceSpec};
use crate::kube;

const COMPONENT: &str = "stratus:components:Services";

const HELM_RELEASE: &str = "kubernetes:helm.sh/v3:Release";

const AUTH_CONFIG_MAP: &str = "aws-auth";
const SYSTEM_NAMESPACE: &str = "kube-system";
const NODE_USERNAME: &str = "system:node:{{EC2PrivateDNSName}}";
const ADMIN_GROUP: &str = "system:masters";

const EBS_CSI_REPO: &str = "https://kubernetes-sigs.github.io/aws-ebs-csi-driver";
const TRAEFIK_REPO: &str = "https://traefik.github.io/charts/";
const TRAEFIK_NAMESPACE: &str = "traefik";
const TRAEFIK_ADMIN_PORT: u16 = 9000;

/// Images kept per repository
pub const RETAINED_IMAGES: u32 = 30;

#[derive(Debug, Clone)]
pub struct ServicesArgs {
    pub worker_role_arn: Output<String>,
    /// IAM user ARNs granted cluster admin
    pub kube_users: Vec<String>,
    /// IAM role ARNs granted cluster admin
    pub kube_admin_roles: Vec<String>,
    pub ebs_csi_chart_version: String,
    pub traefik_chart_version: String,
    pub registry_name: String,
    pub metrics_server_manifest: String,
    pub base_tags: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ServicesOutputs {
    pub registry: ResourceHandle,
    pub registry_url: Output<String>,
    pub traefik_namespace: ResourceHandle,
}

#[derive(Debug, Serialize)]
struct RoleMapping {
    rolearn: String,
    username: String,
    groups: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct UserMapping {
    userarn: String,
    username: String,
    groups: Vec<&'static str>,
}

/// Last path segment of an IAM ARN (`arn:aws:iam::1:user/ops/alice` -> `alice`)
pub fn principal_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

fn admin_roles(roles: &[String]) -> Vec<RoleMapping> {
    roles
        .iter()
        .map(|arn| RoleMapping {
            rolearn: arn.clone(),
            username: principal_name(arn).to_string(),
            groups: vec![ADMIN_GROUP],
        })
        .collect()
}

fn node_role(worker_role_arn: String) -> RoleMapping {
    RoleMapping {
        rolearn: worker_role_arn,
        username: NODE_USERNAME.to_string(),
        groups: vec!["system:bootstrappers", "system:nodes"],
    }
}

/// `mapUsers` document of the auth config map
pub fn map_users(users: &[String]) -> Result<String> {
    let mappings: Vec<UserMapping> = users
        .iter()
        .map(|arn| UserMapping {
            userarn: arn.clone(),
            username: principal_name(arn).to_string(),
            groups: vec![ADMIN_GROUP],
        })
        .collect();
    Ok(serde_yaml::to_string(&mappings)?)
}

/// `mapRoles` document of the auth config map
///
/// A known worker role renders as YAML. A pending one is handed to the engine
/// as `jsonencode`, which the authenticator parses as YAML too.
pub fn map_roles(worker_role_arn: &Output<String>, admin: &[String]) -> Result<Output<String>> {
    if let Some(arn) = worker_role_arn.value() {
        let mut mappings = vec![node_role(arn.clone())];
        mappings.extend(admin_roles(admin));
        return Ok(Output::known(serde_yaml::to_string(&mappings)?));
    }

    let node = Output::<JsonValue>::json_object(vec![
        ("rolearn", worker_role_arn.erase()),
        ("username", Output::known(json!(NODE_USERNAME))),
        ("groups", Output::known(json!(["system:bootstrappers", "system:nodes"]))),
    ]);
    let mut items = vec![node];
    for mapping in admin_roles(admin) {
        items.push(Output::known(serde_json::to_value(mapping)?));
    }
    Ok(Output::<JsonValue>::call(
        Function::JsonEncode,
        vec![Output::<JsonValue>::json_array(items)],
    ))
}

/// Helm values of the ingress controller
pub fn traefik_values() -> JsonValue {
    json!({
        "ingressClass": {
            "enabled": true,
            "isDefaultClass": false,
        },
        "ingressRoute": {
            "dashboard": { "enabled": false },
        },
        "ports": {
            "traefik": {
                "expose": true,
                "exposedPort": TRAEFIK_ADMIN_PORT,
                "nodePort": INGRESS_ADMIN_NODE_PORT,
            },
            "web": {
                "expose": true,
                "nodePort": INGRESS_WEB_NODE_PORT,
            },
        },
        "service": { "type": "NodePort" },
    })
}

/// Registry lifecycle policy expiring images beyond [`RETAINED_IMAGES`]
pub fn lifecycle_policy() -> String {
    json!({
        "rules": [{
            "rulePriority": 1,
            "description": format!("Expire images count more than {RETAINED_IMAGES}"),
            "selection": {
                "tagStatus": "any",
                "countType": "imageCountMoreThan",
                "countNumber": RETAINED_IMAGES,
            },
            "action": { "type": "expire" },
        }]
    })
    .to_string()
}

pub fn declare(graph: &mut ResourceGraph, name: &str, args: &ServicesArgs) -> Result<ServicesOutputs> {
    let root = graph.component(name, COMPONENT, None)?;

    // Auth
    let mut auth = kube::config_map(
        AUTH_CONFIG_MAP,
        SYSTEM_NAMESPACE,
        BTreeMap::from([("mapUsers".to_string(), map_users(&args.kube_users)?)]),
    )?;
    auth["data"]["mapRoles"] = map_roles(&args.worker_role_arn, &args.kube_admin_roles)?.to_json();
    graph.declare(
        ResourceSpec::new(format!("{name}-kauth"), "kubernetes:core/v1:ConfigMap")
            .parent(&root)
            .properties(auth),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-metric-server"), "kubernetes:yaml:ConfigFile")
            .parent(&root)
            .prop("file", &args.metrics_server_manifest),
    )?;

    graph.declare(
        ResourceSpec::new(format!("{name}-ebs-csi"), HELM_RELEASE)
            .parent(&root)
            .properties(json!({
                "chart": "aws-ebs-csi-driver",
                "namespace": SYSTEM_NAMESPACE,
                "repositoryOpts": { "repo": EBS_CSI_REPO },
                "version": args.ebs_csi_chart_version,
                "values": {},
            })),
    )?;

    // Ingress controller
    let traefik_namespace = graph.declare(
        ResourceSpec::new(format!("{name}-traefik-ns"), types::K8S_NAMESPACE)
            .parent(&root)
            .properties(kube::namespace(TRAEFIK_NAMESPACE)?),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-traefik"), HELM_RELEASE)
            .parent(&root)
            .properties(json!({
                "chart": "traefik",
                "namespace": traefik_namespace.attr::<String>("metadata.name"),
                "repositoryOpts": { "repo": TRAEFIK_REPO },
                "version": args.traefik_chart_version,
                "values": traefik_values(),
            })),
    )?;

    // Registry
    let registry = graph.declare(
        ResourceSpec::new(format!("{name}-ecr-repository"), "aws:ecr/repository:Repository")
            .parent(&root)
            .prop("name", &args.registry_name)
            .prop("tags", tags(&args.base_tags, &[])),
    )?;
    graph.declare(
        ResourceSpec::new(format!("{name}-lifecycle-policy"), "aws:ecr/lifecyclePolicy:LifecyclePolicy")
            .parent(&registry)
            .prop("repository", registry.attr::<String>("name"))
            .prop("policy", lifecycle_policy()),
    )?;

    Ok(ServicesOutputs {
        registry_url: registry.attr("repositoryUrl"),
        registry,
        traefik_namespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{StackId, StackKind, lit};

    fn args(worker: Output<String>) -> ServicesArgs {
        ServicesArgs {
            worker_role_arn: worker,
            kube_users: vec!["arn:aws:iam::123456789012:user/ops/alice".to_string()],
            kube_admin_roles: vec!["arn:aws:iam::123456789012:role/ci-role".to_string()],
            ebs_csi_chart_version: "2.22.0".to_string(),
            traefik_chart_version: "v23.2.0".to_string(),
            registry_name: "demoapp".to_string(),
            metrics_server_manifest: "metric_server.yaml".to_string(),
            base_tags: IndexMap::new(),
        }
    }

    fn declared(worker: Output<String>) -> (ResourceGraph, ServicesOutputs) {
        let mut g = ResourceGraph::new(StackId::new(StackKind::Services, "demo"));
        let out = declare(&mut g, "demo-svcs", &args(worker)).unwrap();
        (g, out)
    }

    #[test]
    fn test_principal_name() {
        assert_eq!(principal_name("arn:aws:iam::1:user/ops/alice"), "alice");
        assert_eq!(principal_name("bob"), "bob");
    }

    #[test]
    fn test_map_users() {
        let yaml = map_users(&["arn:aws:iam::1:user/alice".to_string()]).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed[0]["userarn"], "arn:aws:iam::1:user/alice");
        assert_eq!(parsed[0]["username"], "alice");
        assert_eq!(parsed[0]["groups"][0], "system:masters");
    }

    #[test]
    fn test_map_roles_known_worker() {
        let roles = map_roles(
            &lit("arn:aws:iam::1:role/demo-k-worker-role"),
            &["arn:aws:iam::1:role/ci-role".to_string()],
        )
        .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(roles.value().unwrap()).unwrap();
        assert_eq!(parsed[0]["username"], NODE_USERNAME);
        assert_eq!(parsed[0]["groups"][1], "system:nodes");
        assert_eq!(parsed[1]["username"], "ci-role");
        assert_eq!(parsed[1]["groups"][0], "system:masters");
    }

    #[test]
    fn test_map_roles_pending_worker() {
        let worker = Output::attribute("demo-k-worker-role", "arn");
        let roles = map_roles(&worker, &[]).unwrap();
        assert!(!roles.is_known());
        assert_eq!(roles.to_json()["$fn"], "jsonencode");
    }

    #[test]
    fn test_auth_config_map() {
        let (g, _) = declared(lit("arn:aws:iam::1:role/worker"));
        let auth = g.get("demo-svcs-kauth").unwrap();
        assert_eq!(auth.properties["metadata"]["name"], "aws-auth");
        assert_eq!(auth.properties["metadata"]["namespace"], "kube-system");
        let roles: serde_yaml::Value =
            serde_yaml::from_str(auth.properties["data"]["mapRoles"].as_str().unwrap()).unwrap();
        assert_eq!(roles[0]["rolearn"], "arn:aws:iam::1:role/worker");
        let users: serde_yaml::Value =
            serde_yaml::from_str(auth.properties["data"]["mapUsers"].as_str().unwrap()).unwrap();
        assert_eq!(users[0]["username"], "alice");
    }

    #[test]
    fn test_namespace_before_release() {
        let (g, out) = declared(lit("arn:aws:iam::1:role/worker"));
        assert_eq!(
            g.dependencies("demo-svcs-traefik"),
            vec![out.traefik_namespace.name().to_string()]
        );
        let release = g.get("demo-svcs-traefik").unwrap();
        assert_eq!(release.properties["values"]["ports"]["traefik"]["nodePort"], 30900);
        assert_eq!(release.properties["values"]["ports"]["web"]["nodePort"], 32080);
        assert_eq!(release.properties["values"]["service"]["type"], "NodePort");
    }

    #[test]
    fn test_registry_before_policy() {
        let (g, out) = declared(lit("arn:aws:iam::1:role/worker"));
        assert_eq!(g.dependencies("demo-svcs-lifecycle-policy"), vec!["demo-svcs-ecr-repository"]);
        assert_eq!(out.registry_url.to_json(), json!({"$ref": "demo-svcs-ecr-repository.repositoryUrl"}));

        let policy = g.get("demo-svcs-lifecycle-policy").unwrap();
        let doc: JsonValue = serde_json::from_str(policy.properties["policy"].as_str().unwrap()).unwrap();
        assert_eq!(doc["rules"][0]["selection"]["countNumber"], 30);
        assert!(g.validate().is_ok());
    }
}
