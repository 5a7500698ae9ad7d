//! Service instances

use crate::order::OrderId;
use crate::state::DeploymentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use svcflow_cloud::{CanonicalResource, Csp, DeployerKind, ParsedState};
use svcflow_deployer::FailureReason;

/// Service template the instance was created from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub version: String,
}

impl TemplateRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Input of a REGISTER
#[derive(Debug, Clone)]
pub struct Registration {
    pub service_id: String,
    pub template: TemplateRef,
    pub csp: Csp,
    pub deployer: DeployerKind,
    pub scripts: BTreeMap<String, String>,
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// A deployed (or to-be-deployed) managed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_id: String,
    pub state: DeploymentState,
    pub template: TemplateRef,
    pub csp: Csp,
    pub deployer: DeployerKind,
    pub scripts: BTreeMap<String, String>,

    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,

    /// Full result of the last successful parse
    #[serde(default)]
    pub inventory: Vec<CanonicalResource>,

    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub sensitive_outputs: BTreeSet<String>,

    /// Raw state document the inventory was parsed from
    #[serde(default)]
    pub state_document: Option<String>,

    #[serde(default)]
    pub last_failure: Option<FailureReason>,

    /// Order currently running against the instance
    #[serde(default)]
    pub active_order: Option<OrderId>,

    /// Bumped on every committed change
    pub revision: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn register(registration: Registration) -> Self {
        let now = Utc::now();
        Self {
            service_id: registration.service_id,
            state: DeploymentState::Registered,
            template: registration.template,
            csp: registration.csp,
            deployer: registration.deployer,
            scripts: registration.scripts,
            variables: registration.variables,
            inventory: Vec::new(),
            outputs: BTreeMap::new(),
            sensitive_outputs: BTreeSet::new(),
            state_document: None,
            last_failure: None,
            active_order: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace inventory, outputs and state document with one parse result
    pub fn adopt(&mut self, parsed: ParsedState, state_document: String) {
        self.inventory = parsed.resources;
        self.outputs = parsed.outputs;
        self.sensitive_outputs = parsed.sensitive_outputs;
        self.state_document = Some(state_document);
    }

    /// Soft-deleted after a successful destroy
    pub fn is_deleted(&self) -> bool {
        self.state == DeploymentState::DestroySuccess
    }

    /// Outputs with sensitive values masked
    pub fn visible_outputs(&self) -> BTreeMap<String, serde_json::Value> {
        self.outputs
            .iter()
            .map(|(key, value)| {
                if self.sensitive_outputs.contains(key) {
                    (key.clone(), serde_json::Value::String("********".to_string()))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_outputs_are_masked() {
        let mut instance = ServiceInstance::register(Registration {
            service_id: "svc-1".to_string(),
            template: TemplateRef::new("kafka", "v3.3.2"),
            csp: Csp::HuaweiCloud,
            deployer: DeployerKind::Terraform,
            scripts: BTreeMap::new(),
            variables: BTreeMap::new(),
        });

        let mut parsed = ParsedState::default();
        parsed
            .outputs
            .insert("admin_passwd".to_string(), serde_json::json!("s3cret"));
        parsed
            .outputs
            .insert("endpoint".to_string(), serde_json::json!("10.0.0.1:9092"));
        parsed.sensitive_outputs.insert("admin_passwd".to_string());
        instance.adopt(parsed, "{}".to_string());

        let visible = instance.visible_outputs();
        assert_eq!(visible["admin_passwd"], serde_json::json!("********"));
        assert_eq!(visible["endpoint"], serde_json::json!("10.0.0.1:9092"));
        assert_eq!(instance.state_document.as_deref(), Some("{}"));
    }
}
