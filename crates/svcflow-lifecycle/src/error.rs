//! Lifecycle error types

use crate::order::OrderId;
use crate::state::{DeploymentState, TaskType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Service instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Service instance already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Service {service_id} already has order {order_id} in flight")]
    OrderInFlight { service_id: String, order_id: OrderId },

    #[error("Cannot start {task} on service {service_id} in state {state}")]
    InvalidTransition {
        service_id: String,
        state: DeploymentState,
        task: TaskType,
    },

    #[error("Service instance was destroyed: {0}")]
    InstanceDeleted(String),

    #[error("Migrate order for {0} has no migration target")]
    MissingMigrationTarget(String),

    /// Optimistic concurrency check failed at commit time
    #[error("Commit conflict on service {service_id}: {reason}")]
    Conflict { service_id: String, reason: String },

    #[error("Lifecycle store is locked by {holder} since {since}")]
    StoreLocked { holder: String, since: String },

    #[error("Lifecycle store version {found} is newer than supported version {supported}")]
    StoreVersion { found: u32, supported: u32 },

    #[error("Cloud error: {0}")]
    Cloud(#[from] svcflow_cloud::CloudError),

    #[error("Deployer error: {0}")]
    Deployer(#[from] svcflow_deployer::DeployerError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
