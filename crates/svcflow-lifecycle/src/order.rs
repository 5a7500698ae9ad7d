//! Lifecycle orders

use crate::state::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use svcflow_cloud::{Csp, DeployerKind};
use svcflow_deployer::{CorrelationId, FailureReason};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, not (or not yet again) handed to the deployer
    Pending,
    /// Dispatched under the order's current correlation id
    InFlight,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::InFlight)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::InFlight => write!(f, "in-flight"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where a migration moves the service to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationTarget {
    pub csp: Csp,
    pub deployer: DeployerKind,
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// Request payload of an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Input variables, overriding the instance's own
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,

    /// Environment for the deployer process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationTarget>,
}

impl OrderRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_migration(mut self, target: MigrationTarget) -> Self {
        self.migration = Some(target);
        self
    }
}

/// Step of a migrate order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Tear down the current deployment
    Destroy,
    /// Bring the service up on the target
    Deploy,
    /// Redeploy the original after a failed teardown
    Compensate,
}

/// One requested operation on a service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleOrder {
    pub order_id: OrderId,
    pub service_id: String,
    pub task_type: TaskType,
    pub request: OrderRequest,
    pub status: OrderStatus,

    /// Correlation id of the current dispatch
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,

    /// Order that spawned this one (rollback of a failed deploy)
    #[serde(default)]
    pub parent_order_id: Option<OrderId>,

    #[serde(default)]
    pub phase: Option<MigrationPhase>,

    /// State document to hand to the deployer instead of the instance's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_state: Option<String>,

    #[serde(default)]
    pub failure: Option<FailureReason>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LifecycleOrder {
    pub fn new(service_id: impl Into<String>, task_type: TaskType, request: OrderRequest) -> Self {
        Self {
            order_id: OrderId::new(),
            service_id: service_id.into(),
            task_type,
            request,
            status: OrderStatus::Pending,
            correlation_id: None,
            parent_order_id: None,
            phase: (task_type == TaskType::Migrate).then_some(MigrationPhase::Destroy),
            handoff_state: None,
            failure: None,
            created_at: Utc::now(),
            dispatched_at: None,
            completed_at: None,
        }
    }

    /// Rollback order for the leftovers of a failed deploy
    pub fn rollback_of(parent: &LifecycleOrder, leftover_state: Option<String>) -> Self {
        let mut order = Self::new(
            parent.service_id.clone(),
            TaskType::Rollback,
            OrderRequest {
                variables: parent.request.variables.clone(),
                env: parent.request.env.clone(),
                migration: None,
            },
        );
        order.parent_order_id = Some(parent.order_id);
        order.handoff_state = leftover_state;
        order
    }

    /// Still awaiting the callback for `correlation_id`
    pub fn awaits(&self, correlation_id: CorrelationId) -> bool {
        self.status == OrderStatus::InFlight && self.correlation_id == Some(correlation_id)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Close the order
    pub fn finish(&mut self, failure: Option<FailureReason>) {
        self.status = if failure.is_some() {
            OrderStatus::Failed
        } else {
            OrderStatus::Completed
        };
        self.failure = failure;
        self.completed_at = Some(Utc::now());
    }

    /// Move a migrate order to its next phase; it goes back to pending until
    /// the next dispatch assigns a fresh correlation id
    pub fn advance(&mut self, phase: MigrationPhase) {
        self.phase = Some(phase);
        self.status = OrderStatus::Pending;
        self.correlation_id = None;
        self.dispatched_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_orders_start_with_teardown() {
        let order = LifecycleOrder::new("svc-1", TaskType::Migrate, OrderRequest::new());
        assert_eq!(order.phase, Some(MigrationPhase::Destroy));
        assert_eq!(order.status, OrderStatus::Pending);

        let deploy = LifecycleOrder::new("svc-1", TaskType::Deploy, OrderRequest::new());
        assert_eq!(deploy.phase, None);
    }

    #[test]
    fn test_advance_drops_correlation() {
        let mut order = LifecycleOrder::new("svc-1", TaskType::Migrate, OrderRequest::new());
        let correlation_id = CorrelationId::new();
        order.status = OrderStatus::InFlight;
        order.correlation_id = Some(correlation_id);
        assert!(order.awaits(correlation_id));

        order.advance(MigrationPhase::Deploy);
        assert!(!order.awaits(correlation_id));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_rollback_links_parent() {
        let parent = LifecycleOrder::new(
            "svc-1",
            TaskType::Deploy,
            OrderRequest::new().with_env("OS_REGION_NAME", "eu-de"),
        );
        let child = LifecycleOrder::rollback_of(&parent, Some("{}".to_string()));
        assert_eq!(child.parent_order_id, Some(parent.order_id));
        assert_eq!(child.task_type, TaskType::Rollback);
        assert_eq!(child.request.env, parent.request.env);
        assert_eq!(child.handoff_state.as_deref(), Some("{}"));
    }
}
