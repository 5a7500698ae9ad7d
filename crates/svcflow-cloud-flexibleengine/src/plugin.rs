//! FlexibleEngine mapping plugin

use svcflow_cloud::{Csp, CspPlugin, DeployerKind, MappingRule, MappingTable, ResourceKind, Result};

const SUPPORTED_DEPLOYERS: &[DeployerKind] = &[DeployerKind::Terraform, DeployerKind::OpenTofu];

const CREDENTIAL_ENV: &[&str] = &[
    "OS_ACCESS_KEY",
    "OS_SECRET_KEY",
    "OS_REGION_NAME",
    "OS_DOMAIN_NAME",
];

pub struct FlexibleEnginePlugin {
    table: MappingTable,
}

impl FlexibleEnginePlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: MappingTable::new(Csp::FlexibleEngine, mapping_rules())?,
        })
    }
}

impl CspPlugin for FlexibleEnginePlugin {
    fn csp(&self) -> Csp {
        Csp::FlexibleEngine
    }

    fn display_name(&self) -> &str {
        "FlexibleEngine"
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }

    fn supported_deployers(&self) -> &[DeployerKind] {
        SUPPORTED_DEPLOYERS
    }

    fn credential_env(&self) -> &[&'static str] {
        CREDENTIAL_ENV
    }
}

fn mapping_rules() -> Vec<MappingRule> {
    vec![
        MappingRule::new("flexibleengine_compute_instance_v2", ResourceKind::Vm)
            .field("ip", "access_ip_v4")
            .field("image_id", "image_id")
            .field("image_name", "image_name")
            .field("region", "region")
            // project the instance is billed to
            .field("project_id", "owner"),
        MappingRule::new("flexibleengine_blockstorage_volume_v2", ResourceKind::Volume)
            .field("size", "size")
            .field("type", "volume_type"),
        MappingRule::new("flexibleengine_vpc_eip", ResourceKind::PublicIp).field("ip", "address"),
        MappingRule::new("flexibleengine_vpc_v1", ResourceKind::Vpc)
            .field("cidr", "cidr")
            .field("region", "region"),
        MappingRule::new("flexibleengine_vpc_subnet_v1", ResourceKind::Subnet)
            .field("vpc", "vpc_id")
            .field("subnet", "cidr")
            .field("gateway", "gateway_ip"),
        MappingRule::new("flexibleengine_compute_keypair_v2", ResourceKind::Keypair)
            .field("public_key", "public_key")
            .field("private_key", "private_key_path"),
        MappingRule::new(
            "flexibleengine_networking_secgroup_v2",
            ResourceKind::SecurityGroup,
        )
        .field("description", "description"),
        MappingRule::new(
            "flexibleengine_networking_secgroup_rule_v2",
            ResourceKind::SecurityGroupRule,
        )
        .field("direction", "direction")
        .field("ethertype", "ethertype")
        .field("protocol", "protocol")
        .field("remote_ip_prefix", "remote_ip_prefix")
        .field("port_range_min", "port_range_min")
        .field("port_range_max", "port_range_max"),
    ]
}
