//! Cloud abstraction error types

use crate::plugin::{Csp, DeployerKind};
use thiserror::Error;

/// Cloud abstraction errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("No plugin registered for CSP: {0}")]
    PluginNotFound(Csp),

    #[error("Plugin already registered for CSP: {0}")]
    DuplicatePlugin(Csp),

    #[error("Deployer {deployer} is not supported by CSP {csp}")]
    DeployerNotSupported { csp: Csp, deployer: DeployerKind },

    #[error("Duplicate mapping rule for '{provider_type}' in CSP {csp}")]
    DuplicateMapping { csp: Csp, provider_type: String },

    #[error("Unknown CSP: {0}")]
    UnknownCsp(String),

    #[error("Unknown deployer kind: {0}")]
    UnknownDeployer(String),

    #[error("Malformed state document: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
