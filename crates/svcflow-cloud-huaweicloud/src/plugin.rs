//! Huawei Cloud mapping plugin

use svcflow_cloud::{Csp, CspPlugin, DeployerKind, MappingRule, MappingTable, ResourceKind, Result};

const SUPPORTED_DEPLOYERS: &[DeployerKind] = &[DeployerKind::Terraform, DeployerKind::OpenTofu];

const CREDENTIAL_ENV: &[&str] = &[
    "HW_ACCESS_KEY",
    "HW_SECRET_KEY",
    "HW_REGION_NAME",
    "HW_PROJECT_ID",
];

/// Huawei Cloud plugin
pub struct HuaweiCloudPlugin {
    table: MappingTable,
}

impl HuaweiCloudPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: MappingTable::new(Csp::HuaweiCloud, mapping_rules())?,
        })
    }
}

impl CspPlugin for HuaweiCloudPlugin {
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
        SUPPORTED_DEPLOYERS
    }

    fn credential_env(&self) -> &[&'static str] {
        CREDENTIAL_ENV
    }
}

fn mapping_rules() -> Vec<MappingRule> {
    vec![
        MappingRule::new("huaweicloud_compute_instance", ResourceKind::Vm)
            .field("ip", "access_ip_v4")
            .field("image_id", "image_id")
            .field("image_name", "image_name")
            .field("region", "region"),
        MappingRule::new("huaweicloud_evs_volume", ResourceKind::Volume)
            .field("size", "size")
            .field("type", "volume_type"),
        MappingRule::new("huaweicloud_vpc_eip", ResourceKind::PublicIp).field("ip", "address"),
        MappingRule::new("huaweicloud_vpc", ResourceKind::Vpc)
            .field("cidr", "cidr")
            .field("region", "region"),
        MappingRule::new("huaweicloud_vpc_subnet", ResourceKind::Subnet)
            .field("vpc", "vpc_id")
            .field("subnet", "cidr")
            .field("gateway", "gateway_ip"),
        MappingRule::new("huaweicloud_kps_keypair", ResourceKind::Keypair)
            .field("public_key", "public_key")
            .field("private_key", "key_file"),
        MappingRule::new("huaweicloud_networking_secgroup", ResourceKind::SecurityGroup)
            .field("description", "description"),
        MappingRule::new(
            "huaweicloud_networking_secgroup_rule",
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
