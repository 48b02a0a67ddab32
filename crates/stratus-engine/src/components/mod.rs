//! Reusable infrastructure components
//!
//! A component is a plain function that declares a group of resources under
//! one parent node and returns handles to the values downstream code needs:
//!
//! ```text
//! declare(&mut graph, "demo-vpc", &NetworkArgs { .. }) -> NetworkOutputs
//! ```

pub mod app;
pub mod certificate;
pub mod cluster;
pub mod database;
pub mod network;
pub mod services;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use stratus_core::Output;

use crate::error::EngineError;

pub use app::{AppArgs, AppOutputs};
pub use certificate::{CertificateArgs, CertificateOutputs};
pub use cluster::{ClusterArgs, ClusterOutputs};
pub use database::{DatabaseArgs, DatabaseOutputs};
pub use network::{NetworkArgs, NetworkOutputs};
pub use services::{ServicesArgs, ServicesOutputs};

/// Provider type tokens shared by several components
pub mod types {
    pub const ROLE: &str = "aws:iam/role:Role";
    pub const ROLE_POLICY: &str = "aws:iam/rolePolicy:RolePolicy";
    pub const POLICY: &str = "aws:iam/policy:Policy";
    pub const ROLE_POLICY_ATTACHMENT: &str = "aws:iam/rolePolicyAttachment:RolePolicyAttachment";
    pub const SECURITY_GROUP: &str = "aws:ec2/securityGroup:SecurityGroup";
    pub const RECORD: &str = "aws:route53/record:Record";
    pub const GET_ZONE: &str = "aws:route53/getZone:getZone";
    pub const K8S_NAMESPACE: &str = "kubernetes:core/v1:Namespace";
}

/// Base tags plus extra ones, as a tag map property
pub(crate) fn tags(base: &IndexMap<String, String>, extra: &[(&str, &str)]) -> JsonValue {
    let mut map: serde_json::Map<String, JsonValue> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
        .collect();
    for (k, v) in base {
        map.insert(k.clone(), JsonValue::String(v.clone()));
    }
    JsonValue::Object(map)
}

/// List property built from outputs
pub(crate) fn output_list(items: &[Output<String>]) -> Output<JsonValue> {
    Output::<JsonValue>::json_array(items.iter().map(Output::erase).collect())
}

/// Ingress or egress rule of a security group
pub(crate) fn sg_rule(protocol: &str, from_port: u16, to_port: u16, cidrs: &[&str]) -> JsonValue {
    serde_json::json!({
        "protocol": protocol,
        "fromPort": from_port,
        "toPort": to_port,
        "cidrBlocks": cidrs,
    })
}

/// Egress rule allowing all traffic
pub(crate) fn egress_all() -> JsonValue {
    sg_rule("-1", 0, 0, &["0.0.0.0/0"])
}

pub(crate) fn declaration_error(component: &str, message: impl std::fmt::Display) -> EngineError {
    EngineError::Declaration {
        component: component.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_base_wins() {
        let base = IndexMap::from([("Environment".to_string(), "demo".to_string())]);
        let t = tags(&base, &[("Name", "demo-vpc"), ("Environment", "other")]);
        assert_eq!(t["Name"], "demo-vpc");
        assert_eq!(t["Environment"], "demo");
    }

    #[test]
    fn test_egress_all() {
        let rule = egress_all();
        assert_eq!(rule["protocol"], "-1");
        assert_eq!(rule["cidrBlocks"][0], "0.0.0.0/0");
    }
}
