//! DNS-validated ACM certificate

use indexmap::IndexMap;
use serde_json::json;
use stratus_core::Output;

use super::{tags, types};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceSpec};

const COMPONENT: &str = "stratus:components:Certificate";

const VALIDATION_TTL: u32 = 300;

#[derive(Debug, Clone)]
pub struct CertificateArgs {
    pub domain_name: String,
    pub alt_names: Vec<String>,
    /// Hosted zone the validation records are written to
    pub zone_name: String,
    pub base_tags: IndexMap<String, String>,
}

impl CertificateArgs {
    /// Domain then alternative names, in validation option order
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.domain_name.as_str())
            .chain(self.alt_names.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CertificateOutputs {
    pub certificate: ResourceHandle,
    pub arn: Output<String>,
    pub zone_id: Output<String>,
}

/// Whether records for `name` belong in `zone`
pub fn in_zone(name: &str, zone: &str) -> bool {
    let name = name.trim_start_matches("*.");
    name == zone || name.ends_with(&format!(".{zone}"))
}

pub fn declare(
    graph: &mut ResourceGraph,
    name: &str,
    parent: Option<&ResourceHandle>,
    args: &CertificateArgs,
) -> Result<CertificateOutputs> {
    let root = graph.component(name, COMPONENT, parent)?;

    let zone = graph.lookup(
        ResourceSpec::new(format!("{name}-zone"), types::GET_ZONE)
            .parent(&root)
            .prop("name", &args.zone_name),
    )?;

    let certificate = graph.declare(
        ResourceSpec::new(format!("{name}-certificate"), "aws:acm/certificate:Certificate")
            .parent(&root)
            .properties(json!({
                "domainName": args.domain_name,
                "subjectAlternativeNames": args.alt_names,
                "validationMethod": "DNS",
                "tags": tags(&args.base_tags, &[]),
            })),
    )?;

    let zone_suffix = format!(".{}.", args.zone_name);
    for (i, domain) in args.names().into_iter().enumerate() {
        if !in_zone(domain, &args.zone_name) {
            continue;
        }
        let option = |field: &str| -> Output<String> {
            certificate.attr(&format!("domainValidationOptions[{i}].{field}"))
        };
        graph.declare(
            ResourceSpec::new(format!("{name}-dvo-records-{i}"), types::RECORD)
                .parent(&certificate)
                .properties(json!({
                    "allowOverwrite": true,
                    "name": option("resourceRecordName").trim_suffix(&zone_suffix),
                    "type": option("resourceRecordType"),
                    "records": [option("resourceRecordValue")],
                    "ttl": VALIDATION_TTL,
                    "zoneId": zone.attr::<String>("zoneId"),
                })),
        )?;
    }

    Ok(CertificateOutputs {
        arn: certificate.arn(),
        zone_id: zone.attr("zoneId"),
        certificate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{StackId, StackKind};

    fn args(alt: &[&str]) -> CertificateArgs {
        CertificateArgs {
            domain_name: "api.cloudlan.net".to_string(),
            alt_names: alt.iter().map(|a| a.to_string()).collect(),
            zone_name: "cloudlan.net".to_string(),
            base_tags: IndexMap::new(),
        }
    }

    #[test]
    fn test_in_zone() {
        assert!(in_zone("api.cloudlan.net", "cloudlan.net"));
        assert!(in_zone("*.cloudlan.net", "cloudlan.net"));
        assert!(in_zone("cloudlan.net", "cloudlan.net"));
        assert!(!in_zone("api.notcloudlan.net", "cloudlan.net"));
        assert!(!in_zone("api.example.com", "cloudlan.net"));
    }

    #[test]
    fn test_records_only_inside_zone() {
        let mut g = ResourceGraph::new(StackId::new(StackKind::Cluster, "demo"));
        declare(&mut g, "demo-k-cert", None, &args(&["www.cloudlan.net", "api.example.com"])).unwrap();

        let records = g.names_of_type(types::RECORD);
        assert_eq!(records, vec!["demo-k-cert-dvo-records-0", "demo-k-cert-dvo-records-1"]);

        let record = g.get("demo-k-cert-dvo-records-1").unwrap();
        assert_eq!(record.properties["ttl"], 300);
        assert_eq!(record.properties["allowOverwrite"], true);
        assert_eq!(
            record.properties["name"]["args"][0],
            json!({"$ref": "demo-k-cert-certificate.domainValidationOptions[1].resourceRecordName"})
        );
        assert_eq!(record.properties["name"]["args"][1], ".cloudlan.net.");
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_certificate_properties() {
        let mut g = ResourceGraph::new(StackId::new(StackKind::Cluster, "demo"));
        let out = declare(&mut g, "demo-k-cert", None, &args(&[])).unwrap();
        let cert = g.get(out.certificate.name()).unwrap();
        assert_eq!(cert.properties["validationMethod"], "DNS");
        assert_eq!(out.arn.to_json(), json!({"$ref": "demo-k-cert-certificate.arn"}));
    }
}
