//! Policy gate
//!
//! Policy evaluation itself lives outside this crate. The coordinator only
//! hands the dry-run plan of a deploy or modify to an evaluator and refuses
//! to dispatch when it does not pass.

use async_trait::async_trait;

/// Result of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Pass,
    Fail { reason: String },
}

impl PolicyVerdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        PolicyVerdict::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, PolicyVerdict::Pass)
    }
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate the policies attached to `service_id` against a plan JSON
    async fn evaluate(&self, service_id: &str, plan: &str) -> PolicyVerdict;
}
