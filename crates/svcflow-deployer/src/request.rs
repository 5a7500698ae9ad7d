//! Requests sent to a deployer executor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use svcflow_cloud::{Csp, DeployerKind};
use uuid::Uuid;

/// Opaque token linking an asynchronous callback to the order that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Infrastructure operation the deployer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Modify,
    Destroy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deploy => "deploy",
            Operation::Modify => "modify",
            Operation::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a deployer needs to run one script set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerRequest {
    pub order_id: Uuid,
    pub service_id: String,
    pub operation: Operation,
    pub csp: Csp,
    pub deployer: DeployerKind,

    /// File name -> content of the declarative script set
    pub scripts: BTreeMap<String, String>,

    /// Input variables, written as a tfvars JSON file
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,

    /// Environment variables for the deployer process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Last known state document, for operations on existing infrastructure
    #[serde(default)]
    pub prior_state: Option<String>,
}

impl DeployerRequest {
    pub fn new(
        order_id: Uuid,
        service_id: impl Into<String>,
        operation: Operation,
        csp: Csp,
        deployer: DeployerKind,
    ) -> Self {
        Self {
            order_id,
            service_id: service_id.into(),
            operation,
            csp,
            deployer,
            scripts: BTreeMap::new(),
            variables: BTreeMap::new(),
            env: BTreeMap::new(),
            prior_state: None,
        }
    }

    pub fn with_scripts(mut self, scripts: BTreeMap<String, String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_prior_state(mut self, prior_state: Option<String>) -> Self {
        self.prior_state = prior_state;
        self
    }
}
