//! svcflow Lifecycle Engine
//!
//! Owns the deployment state of every managed service instance and drives
//! lifecycle orders (deploy, modify, destroy, purge, migrate and the
//! automatic rollback of failed deploys) through the deployer gateway.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use svcflow_deployer::Gateway;
//! use svcflow_lifecycle::{Coordinator, MemoryStore, OrderRequest, StoreCorrelations, TaskType};
//!
//! # async fn example(registry: Arc<svcflow_cloud::PluginRegistry>) -> svcflow_lifecycle::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let gateway = Gateway::new(
//!     Arc::new(StoreCorrelations::new(store.clone())),
//!     tx,
//!     std::time::Duration::from_secs(3600),
//! );
//! let coordinator = Arc::new(Coordinator::new(registry, Arc::new(gateway), store));
//!
//! let callbacks = coordinator.clone();
//! tokio::spawn(async move { callbacks.run_callbacks(rx).await });
//!
//! let order_id = coordinator
//!     .execute("svc-1", TaskType::Deploy, OrderRequest::new())
//!     .await?;
//! println!("order {order_id} accepted");
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod instance;
pub mod machine;
pub mod order;
pub mod policy;
pub mod reconcile;
pub mod state;
pub mod store;

// Re-exports
pub use coordinator::{Coordinator, Disposition, RecoveryReport};
pub use error::{LifecycleError, Result};
pub use instance::{Registration, ServiceInstance, TemplateRef};
pub use order::{
    LifecycleOrder, MigrationPhase, MigrationTarget, OrderId, OrderRequest, OrderStatus,
};
pub use policy::{PolicyEvaluator, PolicyVerdict};
pub use reconcile::{Resolution, resolve};
pub use state::{DeploymentState, TaskType};
pub use store::{Commit, FileStore, LifecycleStore, MemoryStore, StoreCorrelations};
