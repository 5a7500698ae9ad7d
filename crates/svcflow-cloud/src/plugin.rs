//! CSP plugin trait definition

use crate::error::CloudError;
use crate::mapping::MappingTable;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Cloud service providers known to svcflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Csp {
    HuaweiCloud,
    FlexibleEngine,
    Openstack,
    Scs,
}

impl Csp {
    pub const ALL: [Csp; 4] = [Csp::HuaweiCloud, Csp::FlexibleEngine, Csp::Openstack, Csp::Scs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Csp::HuaweiCloud => "huawei-cloud",
            Csp::FlexibleEngine => "flexible-engine",
            Csp::Openstack => "openstack",
            Csp::Scs => "scs",
        }
    }
}

impl std::fmt::Display for Csp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Csp {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Csp::ALL
            .into_iter()
            .find(|csp| csp.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CloudError::UnknownCsp(s.to_string()))
    }
}

/// Deployer tool that runs the declarative script set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployerKind {
    Terraform,
    #[serde(rename = "opentofu")]
    OpenTofu,
}

impl DeployerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployerKind::Terraform => "terraform",
            DeployerKind::OpenTofu => "opentofu",
        }
    }
}

impl std::fmt::Display for DeployerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployerKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terraform" => Ok(DeployerKind::Terraform),
            "opentofu" | "tofu" => Ok(DeployerKind::OpenTofu),
            _ => Err(CloudError::UnknownDeployer(s.to_string())),
        }
    }
}

/// CSP plugin abstraction trait
///
/// Every supported cloud (Huawei Cloud, OpenStack, etc.) implements this trait
/// to describe how its deployer resource schema maps onto canonical resources.
/// Plugins are registered once at startup and are immutable afterwards.
pub trait CspPlugin: Send + Sync {
    /// Returns the CSP this plugin serves
    fn csp(&self) -> Csp;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Static resource mapping table for this CSP
    fn mapping_table(&self) -> &MappingTable;

    /// Deployer kinds that can drive scripts for this CSP
    fn supported_deployers(&self) -> &[DeployerKind];

    /// Environment variables forwarded from the host to the deployer process
    /// (credentials, auth endpoints) when the order does not set them itself
    fn credential_env(&self) -> &[&'static str] {
        &[]
    }

    fn supports(&self, deployer: DeployerKind) -> bool {
        self.supported_deployers().contains(&deployer)
    }
}
