//! Lifecycle persistence
//!
//! The engine needs atomic read-modify-write access to a service instance and
//! its orders as one unit. Every mutation goes through [`StoreDocument`],
//! which enforces:
//!
//! - at most one open order per instance (checked under the store lock when
//!   an order begins)
//! - compare-and-set commits: the instance revision must be unchanged and the
//!   order must still await the correlation id being settled
//!
//! Backends only decide where the document lives.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{LifecycleError, Result};
use crate::instance::ServiceInstance;
use crate::machine::{self, Rejection};
use crate::order::{LifecycleOrder, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use svcflow_deployer::{CorrelationId, CorrelationStore, DeployerError};
use uuid::Uuid;

pub(crate) const STORE_VERSION: u32 = 1;

/// Result of one completed step, committed as a unit
#[derive(Debug, Clone)]
pub struct Commit {
    /// Order after the step
    pub order: LifecycleOrder,
    /// Instance after the step
    pub instance: ServiceInstance,
    /// Instance revision the step was computed from
    pub expected_revision: u64,
    /// Correlation id being settled; `None` settles an undispatched order
    pub expected_correlation: Option<CorrelationId>,
    /// Follow-up order created by the step
    pub spawned: Option<LifecycleOrder>,
}

#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Create an instance; fails if the service id is taken
    async fn insert_instance(&self, instance: ServiceInstance) -> Result<()>;

    async fn instance(&self, service_id: &str) -> Result<Option<ServiceInstance>>;

    async fn order(&self, order_id: OrderId) -> Result<Option<LifecycleOrder>>;

    /// Orders of a service, oldest first
    async fn orders_of(&self, service_id: &str) -> Result<Vec<LifecycleOrder>>;

    /// Pending and in-flight orders across all services
    async fn open_orders(&self) -> Result<Vec<LifecycleOrder>>;

    /// Order a correlation id was issued for, current or not
    async fn order_for(&self, correlation_id: CorrelationId) -> Result<Option<LifecycleOrder>>;

    /// Atomically check the instance can start the order, move it to the
    /// in-progress state and record the order
    async fn begin_order(&self, order: LifecycleOrder) -> Result<ServiceInstance>;

    /// Mark an open order as dispatched under a fresh correlation id
    async fn record_dispatch(
        &self,
        order_id: OrderId,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Compare-and-set commit of instance, order and spawned order
    async fn commit(&self, commit: Commit) -> Result<ServiceInstance>;
}

/// Everything the store persists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreDocument {
    pub version: u32,

    #[serde(default)]
    pub instances: BTreeMap<String, ServiceInstance>,

    #[serde(default)]
    pub orders: BTreeMap<OrderId, LifecycleOrder>,

    /// Every correlation id ever issued
    #[serde(default)]
    pub correlations: BTreeMap<CorrelationId, OrderId>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            instances: BTreeMap::new(),
            orders: BTreeMap::new(),
            correlations: BTreeMap::new(),
        }
    }
}

impl StoreDocument {
    pub fn insert_instance(&mut self, instance: ServiceInstance) -> Result<()> {
        if self.instances.contains_key(&instance.service_id) {
            return Err(LifecycleError::AlreadyRegistered(instance.service_id));
        }
        self.instances.insert(instance.service_id.clone(), instance);
        Ok(())
    }

    pub fn orders_of(&self, service_id: &str) -> Vec<LifecycleOrder> {
        let mut orders: Vec<LifecycleOrder> = self
            .orders
            .values()
            .filter(|o| o.service_id == service_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    pub fn open_orders(&self) -> Vec<LifecycleOrder> {
        self.orders
            .values()
            .filter(|o| o.is_open())
            .cloned()
            .collect()
    }

    pub fn order_for(&self, correlation_id: CorrelationId) -> Option<LifecycleOrder> {
        self.correlations
            .get(&correlation_id)
            .and_then(|id| self.orders.get(id))
            .cloned()
    }

    pub fn begin_order(&mut self, order: LifecycleOrder) -> Result<ServiceInstance> {
        let instance = self
            .instances
            .get_mut(&order.service_id)
            .ok_or_else(|| LifecycleError::InstanceNotFound(order.service_id.clone()))?;

        if let Some(active) = instance.active_order {
            return Err(LifecycleError::OrderInFlight {
                service_id: instance.service_id.clone(),
                order_id: active,
            });
        }

        let next = machine::begin(instance.state, order.task_type).map_err(|rejection| {
            match rejection {
                Rejection::Deleted => LifecycleError::InstanceDeleted(instance.service_id.clone()),
                Rejection::InFlight | Rejection::NotAllowed => LifecycleError::InvalidTransition {
                    service_id: instance.service_id.clone(),
                    state: instance.state,
                    task: order.task_type,
                },
            }
        })?;

        instance.state = next;
        instance.active_order = Some(order.order_id);
        instance.revision += 1;
        instance.updated_at = Utc::now();
        let snapshot = instance.clone();

        self.orders.insert(order.order_id, order);
        Ok(snapshot)
    }

    pub fn record_dispatch(
        &mut self,
        order_id: OrderId,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(LifecycleError::OrderNotFound(order_id))?;
        if !order.is_open() {
            return Err(LifecycleError::Conflict {
                service_id: order.service_id.clone(),
                reason: format!("order {order_id} is already {}", order.status),
            });
        }

        order.status = OrderStatus::InFlight;
        order.correlation_id = Some(correlation_id);
        order.dispatched_at = Some(dispatched_at);
        self.correlations.insert(correlation_id, order_id);
        Ok(())
    }

    pub fn commit(&mut self, commit: Commit) -> Result<ServiceInstance> {
        let service_id = commit.instance.service_id.clone();
        let stored = self
            .instances
            .get(&service_id)
            .ok_or_else(|| LifecycleError::InstanceNotFound(service_id.clone()))?;
        if stored.revision != commit.expected_revision {
            return Err(LifecycleError::Conflict {
                service_id,
                reason: format!(
                    "revision conflict: expected {}, got {}",
                    commit.expected_revision, stored.revision
                ),
            });
        }

        let order_id = commit.order.order_id;
        let stored_order = self
            .orders
            .get(&order_id)
            .ok_or(LifecycleError::OrderNotFound(order_id))?;
        let awaited = match commit.expected_correlation {
            Some(correlation_id) => stored_order.awaits(correlation_id),
            None => stored_order.status == OrderStatus::Pending,
        };
        if !awaited {
            return Err(LifecycleError::Conflict {
                service_id,
                reason: format!("order {order_id} no longer awaits this result"),
            });
        }

        if !machine::can_settle(stored.state, commit.instance.state) {
            return Err(LifecycleError::InvalidTransition {
                service_id,
                state: stored.state,
                task: commit.order.task_type,
            });
        }

        if let Some(spawned) = &commit.spawned {
            if self.orders.contains_key(&spawned.order_id) {
                return Err(LifecycleError::Conflict {
                    service_id,
                    reason: format!("order {} already exists", spawned.order_id),
                });
            }
        }

        let mut instance = commit.instance;
        instance.revision = commit.expected_revision + 1;
        instance.updated_at = Utc::now();

        if let Some(spawned) = commit.spawned {
            self.orders.insert(spawned.order_id, spawned);
        }
        self.orders.insert(order_id, commit.order);
        self.instances.insert(service_id, instance.clone());
        Ok(instance)
    }
}

/// Adapter persisting the gateway's correlation ids in a lifecycle store
pub struct StoreCorrelations {
    store: Arc<dyn LifecycleStore>,
}

impl StoreCorrelations {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CorrelationStore for StoreCorrelations {
    async fn record_dispatch(
        &self,
        order_id: Uuid,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> svcflow_deployer::Result<()> {
        self.store
            .record_dispatch(OrderId::from(order_id), correlation_id, dispatched_at)
            .await
            .map_err(|e| DeployerError::Correlation(e.to_string()))
    }
}
