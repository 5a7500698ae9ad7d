//! Canonical, provider-independent resource model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a deployed infrastructure object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Vm,
    Volume,
    Vpc,
    Subnet,
    PublicIp,
    SecurityGroup,
    SecurityGroupRule,
    Keypair,
    /// Provider resource type without a mapping rule
    Unknown,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Vm => write!(f, "VM"),
            ResourceKind::Volume => write!(f, "VOLUME"),
            ResourceKind::Vpc => write!(f, "VPC"),
            ResourceKind::Subnet => write!(f, "SUBNET"),
            ResourceKind::PublicIp => write!(f, "PUBLIC_IP"),
            ResourceKind::SecurityGroup => write!(f, "SECURITY_GROUP"),
            ResourceKind::SecurityGroupRule => write!(f, "SECURITY_GROUP_RULE"),
            ResourceKind::Keypair => write!(f, "KEYPAIR"),
            ResourceKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One deployed infrastructure object, described without provider types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalResource {
    /// Canonical kind
    pub kind: ResourceKind,

    /// Provider-issued id (`id` attribute)
    pub resource_id: String,

    /// Display name (`name` attribute)
    pub name: String,

    /// Underlying provider resource type, e.g. `huaweicloud_compute_instance`
    pub group_type: String,

    /// Name of the resource block in the deployer script
    pub group_name: String,

    /// Selected provider attributes under their canonical names
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CanonicalResource {
    pub fn new(
        kind: ResourceKind,
        group_type: impl Into<String>,
        group_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource_id: String::new(),
            name: String::new(),
            group_type: group_type.into(),
            group_name: group_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Address a client connects to (VMs and public IPs only)
    pub fn address(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::Vm | ResourceKind::PublicIp => self.property("ip"),
            _ => None,
        }
    }

    /// Address block of a network
    pub fn cidr(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::Subnet => self.property("subnet"),
            ResourceKind::Vpc => self.property("cidr"),
            _ => None,
        }
    }

    /// Network a subnet belongs to
    pub fn parent_network(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::Subnet => self.property("vpc"),
            _ => None,
        }
    }
}

/// Count resources per kind
pub fn count_by_kind(resources: &[CanonicalResource]) -> BTreeMap<ResourceKind, usize> {
    let mut counts = BTreeMap::new();
    for resource in resources {
        *counts.entry(resource.kind).or_insert(0) += 1;
    }
    counts
}
