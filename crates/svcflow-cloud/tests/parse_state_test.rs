use proptest::prelude::*;
use svcflow_cloud::{
    Csp, CspPlugin, DeployerKind, MappingRule, MappingTable, PluginRegistry, ResourceKind,
    StateParser,
};

struct HuaweiLike {
    table: MappingTable,
}

impl HuaweiLike {
    fn new() -> Self {
        let table = MappingTable::new(
            Csp::HuaweiCloud,
            [
                MappingRule::new("huaweicloud_compute_instance", ResourceKind::Vm)
                    .field("ip", "access_ip_v4")
                    .field("image_id", "image_id"),
                MappingRule::new("huaweicloud_vpc", ResourceKind::Vpc).field("region", "region"),
                MappingRule::new("huaweicloud_vpc_subnet", ResourceKind::Subnet)
                    .field("vpc", "vpc_id")
                    .field("subnet", "cidr"),
            ],
        )
        .unwrap();
        Self { table }
    }
}

impl CspPlugin for HuaweiLike {
    fn csp(&self) -> Csp {
        Csp::HuaweiCloud
    }

    fn display_name(&self) -> &str {
        "Huawei Cloud"
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }

    fn supported_deployers(&self) -> &[DeployerKind] {
        &[DeployerKind::Terraform, DeployerKind::OpenTofu]
    }
}

fn registry() -> PluginRegistry {
    PluginRegistry::builder()
        .register(HuaweiLike::new())
        .unwrap()
        .build()
}

fn vm_state(count: usize) -> String {
    let instances: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "index_key": i,
                "attributes": {
                    "id": format!("vm-{i}"),
                    "name": format!("kafka-{i}"),
                    "access_ip_v4": format!("192.168.0.{}", i + 10),
                    "image_id": "img-123"
                }
            })
        })
        .collect();
    serde_json::json!({
        "version": 4,
        "resources": [{
            "mode": "managed",
            "type": "huaweicloud_compute_instance",
            "name": "kafka",
            "provider": "provider[\"registry.terraform.io/huaweicloud/huaweicloud\"]",
            "instances": instances
        }]
    })
    .to_string()
}

#[test]
fn test_vm_and_vpc_inventory() {
    let raw = r#"{
        "version": 4,
        "terraform_version": "1.6.0",
        "resources": [
            {
                "mode": "managed",
                "type": "huaweicloud_vpc",
                "name": "vpc",
                "instances": [{"attributes": {"id": "vpc-1", "name": "svc-vpc", "region": "eu-west-101"}}]
            },
            {
                "mode": "managed",
                "type": "huaweicloud_compute_instance",
                "name": "web",
                "instances": [{"attributes": {"id": "vm-1", "name": "web-0", "access_ip_v4": "192.168.0.4"}}]
            }
        ],
        "outputs": {
            "endpoint": {"value": "192.168.0.4:9092", "type": "string"}
        }
    }"#;

    let parsed = StateParser::new(&registry())
        .parse(Csp::HuaweiCloud, raw)
        .unwrap();

    let kinds: Vec<ResourceKind> = parsed.resources.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![ResourceKind::Vpc, ResourceKind::Vm]);

    let vm = &parsed.resources[1];
    assert_eq!(vm.resource_id, "vm-1");
    assert_eq!(vm.name, "web-0");
    assert_eq!(vm.group_type, "huaweicloud_compute_instance");
    assert_eq!(vm.group_name, "web");
    assert_eq!(vm.address(), Some("192.168.0.4"));
    // only mapped attributes are copied
    assert_eq!(vm.property("image_id"), None);

    assert_eq!(
        parsed.outputs.get("endpoint"),
        Some(&serde_json::json!("192.168.0.4:9092"))
    );
}

#[test]
fn test_unmapped_type_becomes_unknown() {
    let raw = r#"{
        "resources": [{
            "mode": "managed",
            "type": "huaweicloud_dns_recordset",
            "name": "record",
            "instances": [{"attributes": {"id": "rs-9", "name": "api.example.com", "ttl": 300}}]
        }]
    }"#;

    let parsed = StateParser::new(&registry())
        .parse(Csp::HuaweiCloud, raw)
        .unwrap();

    assert_eq!(parsed.resources.len(), 1);
    let resource = &parsed.resources[0];
    assert_eq!(resource.kind, ResourceKind::Unknown);
    assert_eq!(resource.resource_id, "rs-9");
    assert_eq!(resource.name, "api.example.com");
    assert!(resource.properties.is_empty());
}

#[test]
fn test_identifiers_are_not_coerced() {
    let raw = r#"{
        "resources": [{
            "mode": "managed",
            "type": "huaweicloud_vpc_subnet",
            "name": "subnet",
            "instances": [{"attributes": {
                "id": 90071992547409931234,
                "name": "subnet-a",
                "vpc_id": 0.10000000000000000555,
                "cidr": "192.168.10.0/24"
            }}]
        }]
    }"#;

    let parsed = StateParser::new(&registry())
        .parse(Csp::HuaweiCloud, raw)
        .unwrap();

    let subnet = &parsed.resources[0];
    assert_eq!(subnet.resource_id, "90071992547409931234");
    assert_eq!(subnet.parent_network(), Some("0.10000000000000000555"));
    assert_eq!(subnet.cidr(), Some("192.168.10.0/24"));
}

#[test]
fn test_parse_error_is_never_empty_inventory() {
    let registry = registry();
    let parser = StateParser::new(&registry);
    assert!(parser.parse(Csp::HuaweiCloud, "not json").is_err());
    assert!(parser
        .parse(Csp::HuaweiCloud, r#"{"resources": "oops"}"#)
        .is_err());
}

proptest! {
    #[test]
    fn prop_one_resource_per_instance(count in 0usize..24) {
        let registry = registry();
        let parsed = StateParser::new(&registry)
            .parse(Csp::HuaweiCloud, &vm_state(count))
            .unwrap();
        prop_assert_eq!(parsed.resources.len(), count);
        prop_assert!(parsed.resources.iter().all(|r| r.kind == ResourceKind::Vm));
    }

    #[test]
    fn prop_parse_is_idempotent(count in 0usize..12, provider_type in "[a-z_]{1,24}") {
        let raw = serde_json::json!({
            "resources": [
                serde_json::from_str::<serde_json::Value>(&vm_state(count)).unwrap()["resources"][0].clone(),
                {
                    "mode": "managed",
                    "type": provider_type,
                    "name": "extra",
                    "instances": [{"attributes": {"id": "x-1"}}]
                }
            ]
        })
        .to_string();

        let registry = registry();
        let parser = StateParser::new(&registry);
        let first = parser.parse(Csp::HuaweiCloud, &raw).unwrap();
        let second = parser.parse(Csp::HuaweiCloud, &raw).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_lookup_always_returns_kind(provider_type in ".{0,40}") {
        let registry = registry();
        for csp in Csp::ALL {
            let mapping = registry.lookup(csp, &provider_type);
            if mapping.is_unknown() {
                prop_assert!(mapping.fields.is_empty());
            }
        }
    }
}
