//! Kubernetes manifests
//!
//! Manifests are built with the typed `k8s-openapi` structs and then turned
//! into JSON property bags. Values only known at apply time (the workload
//! role ARN) and secret values are patched into the JSON afterwards, since
//! the typed structs can only hold plain strings.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, Namespace, PodSpec, PodTemplateSpec, Secret,
    Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use stratus_core::Output;

use crate::error::Result;

/// Label selecting the pods of an application
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Annotation binding a service account to an IAM role
pub const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// Target average utilization for CPU and memory scaling
pub const TARGET_UTILIZATION: i32 = 60;

/// Traefik CRD group used for ingress routes
pub const INGRESS_ROUTE_API_VERSION: &str = "traefik.containo.us/v1alpha1";

/// Labels shared by every object of an application
pub fn app_labels(app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_LABEL.to_string(), app_name.to_string())])
}

/// Name of a container or service port
pub fn port_name(port: u16) -> String {
    format!("{port}-tcp")
}

fn meta(name: &str, namespace: Option<&str>, labels: Option<&BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: labels.cloned(),
        ..Default::default()
    }
}

fn to_properties<T: Serialize>(manifest: &T) -> Result<JsonValue> {
    Ok(serde_json::to_value(manifest)?)
}

/// Set `value` at a JSON pointer, creating intermediate objects
fn patch(doc: &mut JsonValue, path: &[&str], value: JsonValue) {
    let mut current = doc;
    for key in path {
        if !current.is_object() {
            *current = JsonValue::Object(serde_json::Map::new());
        }
        let JsonValue::Object(map) = current else {
            return;
        };
        current = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
    }
    *current = value;
}

pub fn namespace(name: &str) -> Result<JsonValue> {
    to_properties(&Namespace {
        metadata: meta(name, None, None),
        ..Default::default()
    })
}

/// Service account assuming `role_arn` through web identity
pub fn service_account(
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    role_arn: &Output<String>,
) -> Result<JsonValue> {
    let mut doc = to_properties(&ServiceAccount {
        metadata: meta(name, Some(namespace), Some(labels)),
        ..Default::default()
    })?;
    patch(
        &mut doc,
        &["metadata", "annotations", ROLE_ARN_ANNOTATION],
        role_arn.to_json(),
    );
    Ok(doc)
}

/// Opaque secret; values go into `stringData` with their secret envelopes
pub fn secret(
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    data: &[(String, Output<String>)],
) -> Result<JsonValue> {
    let mut doc = to_properties(&Secret {
        metadata: meta(name, Some(namespace), Some(labels)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })?;
    let string_data: serde_json::Map<String, JsonValue> = data
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    patch(&mut doc, &["stringData"], JsonValue::Object(string_data));
    Ok(doc)
}

/// Plain config map
pub fn config_map(name: &str, namespace: &str, data: BTreeMap<String, String>) -> Result<JsonValue> {
    to_properties(&ConfigMap {
        metadata: meta(name, Some(namespace), None),
        data: Some(data),
        ..Default::default()
    })
}

/// Workload deployment
#[derive(Debug, Clone)]
pub struct DeploymentArgs<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub container_name: &'a str,
    pub image: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub env: &'a [(String, String)],
    /// Secret injected as environment through `envFrom`
    pub env_secret: Option<&'a str>,
    pub ports: &'a [u16],
    pub service_account: &'a str,
}

pub fn deployment(args: &DeploymentArgs<'_>) -> Result<JsonValue> {
    let env: Vec<EnvVar> = args
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    let ports: Vec<ContainerPort> = args
        .ports
        .iter()
        .map(|port| ContainerPort {
            name: Some(port_name(*port)),
            container_port: i32::from(*port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: args.container_name.to_string(),
        image: Some(args.image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        env: (!env.is_empty()).then_some(env),
        ports: Some(ports),
        ..Default::default()
    };

    let manifest = Deployment {
        metadata: meta(args.name, Some(args.namespace), Some(args.labels)),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(args.labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(args.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    service_account_name: Some(args.service_account.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut doc = to_properties(&manifest)?;
    if let Some(secret_name) = args.env_secret {
        // Patched as JSON: the env source name changed optionality across API versions
        let env_from = json!([{ "secretRef": { "name": secret_name } }]);
        if let Some(container) = doc.pointer_mut("/spec/template/spec/containers/0") {
            patch(container, &["envFrom"], env_from);
        }
    }
    Ok(doc)
}

fn utilization_metric(resource: &str) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(TARGET_UTILIZATION),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// autoscaling/v2 HPA scaling a deployment on CPU and memory
pub fn horizontal_pod_autoscaler(
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    deployment: &str,
    min_replicas: i32,
    max_replicas: i32,
) -> Result<JsonValue> {
    to_properties(&HorizontalPodAutoscaler {
        metadata: meta(name, Some(namespace), Some(labels)),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment.to_string(),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(vec![utilization_metric("cpu"), utilization_metric("memory")]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Cluster-internal service in front of the pods
pub fn service(
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    ports: &[u16],
) -> Result<JsonValue> {
    let ports = ports
        .iter()
        .map(|port| ServicePort {
            name: Some(port_name(*port)),
            port: i32::from(*port),
            target_port: Some(IntOrString::Int(i32::from(*port))),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    to_properties(&Service {
        metadata: meta(name, Some(namespace), Some(labels)),
        spec: Some(ServiceSpec {
            selector: Some(labels.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Traefik route sending the given hosts to a service
///
/// Custom resource, so built as plain JSON.
pub fn ingress_route(
    name: &str,
    namespace: &str,
    hostnames: &[&str],
    service: &str,
    port: u16,
) -> JsonValue {
    let hosts: Vec<String> = hostnames.iter().map(|h| format!("`{h}`")).collect();
    json!({
        "apiVersion": INGRESS_ROUTE_API_VERSION,
        "kind": "IngressRoute",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "entryPoints": ["web"],
            "routes": [{
                "kind": "Rule",
                "match": format!("Host({})", hosts.join(",")),
                "priority": 10,
                "services": [{
                    "kind": "Service",
                    "name": service,
                    "namespace": namespace,
                    "passHostHeader": true,
                    "port": port,
                    "scheme": "http",
                }],
            }],
        },
    })
}
