//! In-process store

use super::{Commit, LifecycleStore, StoreDocument};
use crate::error::Result;
use crate::instance::ServiceInstance;
use crate::order::{LifecycleOrder, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use svcflow_deployer::CorrelationId;
use tokio::sync::Mutex;

/// Store keeping everything in memory; lost on restart
#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn insert_instance(&self, instance: ServiceInstance) -> Result<()> {
        self.document.lock().await.insert_instance(instance)
    }

    async fn instance(&self, service_id: &str) -> Result<Option<ServiceInstance>> {
        Ok(self.document.lock().await.instances.get(service_id).cloned())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<LifecycleOrder>> {
        Ok(self.document.lock().await.orders.get(&order_id).cloned())
    }

    async fn orders_of(&self, service_id: &str) -> Result<Vec<LifecycleOrder>> {
        Ok(self.document.lock().await.orders_of(service_id))
    }

    async fn open_orders(&self) -> Result<Vec<LifecycleOrder>> {
        Ok(self.document.lock().await.open_orders())
    }

    async fn order_for(&self, correlation_id: CorrelationId) -> Result<Option<LifecycleOrder>> {
        Ok(self.document.lock().await.order_for(correlation_id))
    }

    async fn begin_order(&self, order: LifecycleOrder) -> Result<ServiceInstance> {
        self.document.lock().await.begin_order(order)
    }

    async fn record_dispatch(
        &self,
        order_id: OrderId,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<()> {
        self.document
            .lock()
            .await
            .record_dispatch(order_id, correlation_id, dispatched_at)
    }

    async fn commit(&self, commit: Commit) -> Result<ServiceInstance> {
        self.document.lock().await.commit(commit)
    }
}
