//! Deployer state parsing
//!
//! Turns the raw state document written by terraform/OpenTofu into a
//! canonical resource list plus the deployment outputs.
//!
//! Attribute values are kept as opaque strings: strings are unquoted,
//! every other JSON value is copied as its source text, so numeric ids are
//! never rounded through `f64`.

use crate::error::Result;
use crate::plugin::Csp;
use crate::registry::PluginRegistry;
use crate::resource::CanonicalResource;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::{BTreeMap, BTreeSet};

const ID_ATTRIBUTE: &str = "id";
const NAME_ATTRIBUTE: &str = "name";
const DATA_MODE: &str = "data";

#[derive(Debug, Deserialize)]
struct TfState {
    #[serde(default)]
    resources: Vec<TfStateResource>,

    #[serde(default)]
    outputs: BTreeMap<String, TfOutput>,
}

#[derive(Debug, Deserialize)]
struct TfStateResource {
    #[serde(default)]
    mode: Option<String>,

    #[serde(rename = "type")]
    resource_type: String,

    name: String,

    #[serde(default)]
    instances: Vec<TfStateResourceInstance>,
}

#[derive(Debug, Deserialize)]
struct TfStateResourceInstance {
    #[serde(default)]
    attributes: BTreeMap<String, Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct TfOutput {
    #[serde(default)]
    value: serde_json::Value,

    #[serde(default)]
    sensitive: bool,
}

/// Result of one parse pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedState {
    /// Every managed resource instance in document order
    pub resources: Vec<CanonicalResource>,

    /// Deployment outputs, copied verbatim
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// Output keys the deployer flagged as sensitive
    pub sensitive_outputs: BTreeSet<String>,
}

/// State parser bound to a plugin registry
pub struct StateParser<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> StateParser<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Parse a raw state document for a CSP
    ///
    /// A document that cannot be deserialized is an error; an empty or
    /// resource-less document is a valid, empty inventory.
    pub fn parse(&self, csp: Csp, raw: &str) -> Result<ParsedState> {
        let state: TfState = serde_json::from_str(raw)?;
        let mut parsed = ParsedState::default();

        for resource in &state.resources {
            if resource.mode.as_deref() == Some(DATA_MODE) {
                continue;
            }

            let mapping = self.registry.lookup(csp, &resource.resource_type);
            if mapping.is_unknown() {
                tracing::debug!(
                    csp = %csp,
                    resource_type = %resource.resource_type,
                    "No mapping rule, emitting UNKNOWN resource"
                );
            }

            for instance in &resource.instances {
                let attributes = &instance.attributes;
                let mut canonical = CanonicalResource::new(
                    mapping.kind,
                    &resource.resource_type,
                    &resource.name,
                );

                if let Some(id) = attribute_text(attributes, ID_ATTRIBUTE) {
                    canonical.resource_id = id;
                }
                if let Some(name) = attribute_text(attributes, NAME_ATTRIBUTE) {
                    canonical.name = name;
                }

                for (canonical_key, provider_attr) in mapping.fields {
                    if let Some(value) = attribute_text(attributes, provider_attr) {
                        canonical.properties.insert(canonical_key.clone(), value);
                    }
                }

                parsed.resources.push(canonical);
            }
        }

        for (key, output) in state.outputs {
            if output.sensitive {
                parsed.sensitive_outputs.insert(key.clone());
            }
            parsed.outputs.insert(key, output.value);
        }

        tracing::debug!(
            csp = %csp,
            resources = parsed.resources.len(),
            outputs = parsed.outputs.len(),
            "Parsed deployer state"
        );
        Ok(parsed)
    }
}

fn attribute_text(attributes: &BTreeMap<String, Box<RawValue>>, key: &str) -> Option<String> {
    let raw = attributes.get(key)?.get().trim();
    if raw == "null" {
        return None;
    }
    if raw.starts_with('"') {
        return serde_json::from_str::<String>(raw).ok();
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingRule, MappingTable};
    use crate::plugin::{CspPlugin, DeployerKind};
    use crate::resource::ResourceKind;

    struct OpenstackLike(MappingTable);

    impl CspPlugin for OpenstackLike {
        fn csp(&self) -> Csp {
            Csp::Openstack
        }
        fn display_name(&self) -> &str {
            "OpenStack"
        }
        fn mapping_table(&self) -> &MappingTable {
            &self.0
        }
        fn supported_deployers(&self) -> &[DeployerKind] {
            &[DeployerKind::Terraform]
        }
    }

    fn registry() -> PluginRegistry {
        let table = MappingTable::new(
            Csp::Openstack,
            [
                MappingRule::new("openstack_compute_instance_v2", ResourceKind::Vm)
                    .field("ip", "access_ip_v4")
                    .field("region", "region"),
                MappingRule::new("openstack_blockstorage_volume_v3", ResourceKind::Volume)
                    .field("size", "size"),
            ],
        )
        .unwrap();
        PluginRegistry::builder()
            .register(OpenstackLike(table))
            .unwrap()
            .build()
    }

    #[test]
    fn test_attribute_text_is_opaque() {
        let attrs: BTreeMap<String, Box<RawValue>> = serde_json::from_str(
            r#"{"s": "abc", "n": 12345678901234567890123, "f": 1.50, "b": true, "z": null}"#,
        )
        .unwrap();
        assert_eq!(attribute_text(&attrs, "s").as_deref(), Some("abc"));
        assert_eq!(
            attribute_text(&attrs, "n").as_deref(),
            Some("12345678901234567890123")
        );
        assert_eq!(attribute_text(&attrs, "f").as_deref(), Some("1.50"));
        assert_eq!(attribute_text(&attrs, "b").as_deref(), Some("true"));
        assert_eq!(attribute_text(&attrs, "z"), None);
        assert_eq!(attribute_text(&attrs, "missing"), None);
    }

    #[test]
    fn test_data_sources_are_skipped() {
        let raw = r#"{
            "resources": [
                {"mode": "data", "type": "openstack_images_image_v2", "name": "img",
                 "instances": [{"attributes": {"id": "img-1"}}]},
                {"mode": "managed", "type": "openstack_compute_instance_v2", "name": "vm",
                 "instances": [{"attributes": {"id": "vm-1", "name": "web", "access_ip_v4": "10.0.0.2"}}]}
            ]
        }"#;
        let parsed = StateParser::new(&registry()).parse(Csp::Openstack, raw).unwrap();
        assert_eq!(parsed.resources.len(), 1);
        assert_eq!(parsed.resources[0].kind, ResourceKind::Vm);
        assert_eq!(parsed.resources[0].address(), Some("10.0.0.2"));
    }

    #[test]
    fn test_empty_document_is_empty_inventory() {
        let parsed = StateParser::new(&registry())
            .parse(Csp::Openstack, r#"{"version": 4, "resources": []}"#)
            .unwrap();
        assert!(parsed.resources.is_empty());
        assert!(parsed.outputs.is_empty());
    }

    #[test]
    fn test_malformed_document_is_error() {
        let parser_registry = registry();
        let parser = StateParser::new(&parser_registry);
        assert!(parser.parse(Csp::Openstack, "").is_err());
        assert!(parser.parse(Csp::Openstack, "{\"resources\": [").is_err());
        assert!(parser.parse(Csp::Openstack, "[]").is_err());
        assert!(parser
            .parse(Csp::Openstack, r#"{"resources": [{"name": "no-type"}]}"#)
            .is_err());
    }

    #[test]
    fn test_sensitive_outputs_reported() {
        let raw = r#"{
            "outputs": {
                "admin_passwd": {"value": "s3cret", "type": "string", "sensitive": true},
                "endpoint": {"value": "10.0.0.9:9092", "type": "string"}
            },
            "resources": []
        }"#;
        let parsed = StateParser::new(&registry()).parse(Csp::Openstack, raw).unwrap();
        assert_eq!(parsed.outputs.len(), 2);
        assert_eq!(parsed.outputs["admin_passwd"], serde_json::json!("s3cret"));
        assert!(parsed.sensitive_outputs.contains("admin_passwd"));
        assert!(!parsed.sensitive_outputs.contains("endpoint"));
    }
}
