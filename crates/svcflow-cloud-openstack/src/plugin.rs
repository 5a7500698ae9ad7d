//! OpenStack and SCS mapping plugins

use svcflow_cloud::{Csp, CspPlugin, DeployerKind, MappingRule, MappingTable, ResourceKind, Result};

const SUPPORTED_DEPLOYERS: &[DeployerKind] = &[DeployerKind::Terraform, DeployerKind::OpenTofu];

const CREDENTIAL_ENV: &[&str] = &[
    "OS_AUTH_URL",
    "OS_USERNAME",
    "OS_PASSWORD",
    "OS_PROJECT_NAME",
    "OS_USER_DOMAIN_NAME",
    "OS_PROJECT_DOMAIN_NAME",
];

/// Plain OpenStack cloud
pub struct OpenstackPlugin {
    table: MappingTable,
}

impl OpenstackPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: MappingTable::new(Csp::Openstack, mapping_rules(Csp::Openstack))?,
        })
    }
}

impl CspPlugin for OpenstackPlugin {
    fn csp(&self) -> Csp {
        Csp::Openstack
    }

    fn display_name(&self) -> &str {
        "OpenStack"
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

/// Sovereign Cloud Stack
pub struct ScsPlugin {
    table: MappingTable,
}

impl ScsPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: MappingTable::new(Csp::Scs, mapping_rules(Csp::Scs))?,
        })
    }
}

impl CspPlugin for ScsPlugin {
    fn csp(&self) -> Csp {
        Csp::Scs
    }

    fn display_name(&self) -> &str {
        "Sovereign Cloud Stack"
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

fn mapping_rules(csp: Csp) -> Vec<MappingRule> {
    let mut network = MappingRule::new("openstack_networking_network_v2", ResourceKind::Vpc)
        .field("region", "region");
    if csp == Csp::Scs {
        network = network.field("mtu", "mtu");
    }

    vec![
        MappingRule::new("openstack_compute_instance_v2", ResourceKind::Vm)
            .field("ip", "access_ip_v4")
            .field("image_id", "image_id")
            .field("image_name", "image_name")
            .field("region", "region"),
        MappingRule::new("openstack_blockstorage_volume_v3", ResourceKind::Volume)
            .field("size", "size")
            .field("type", "volume_type"),
        MappingRule::new("openstack_networking_floatingip_v2", ResourceKind::PublicIp)
            .field("ip", "address"),
        network,
        MappingRule::new("openstack_networking_subnet_v2", ResourceKind::Subnet)
            .field("vpc", "network_id")
            .field("subnet", "cidr")
            .field("gateway", "gateway_ip"),
        MappingRule::new("openstack_compute_keypair_v2", ResourceKind::Keypair)
            .field("public_key", "public_key")
            .field("private_key", "private_key"),
        MappingRule::new("openstack_networking_secgroup_v2", ResourceKind::SecurityGroup)
            .field("description", "description"),
        MappingRule::new(
            "openstack_networking_secgroup_rule_v2",
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
