//! Reconciliation coordinator
//!
//! Runs lifecycle orders end to end: validates and records the order, builds
//! the deployer request, submits it through the [`Gateway`], and when the
//! result arrives (immediately or through a callback) reconciles it and
//! commits instance and order together.
//!
//! Callbacks are matched purely by correlation id. A result for a correlation
//! id the store never issued, or for a dispatch that was already settled or
//! superseded, is logged at debug and dropped.

use crate::error::{LifecycleError, Result};
use crate::instance::{Registration, ServiceInstance};
use crate::order::{LifecycleOrder, MigrationPhase, OrderId, OrderRequest, OrderStatus};
use crate::policy::{PolicyEvaluator, PolicyVerdict};
use crate::reconcile::{self, Resolution};
use crate::state::{DeploymentState, TaskType};
use crate::store::{Commit, LifecycleStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use svcflow_cloud::PluginRegistry;
use svcflow_deployer::{
    CorrelationId, DeployOutcome, DeployerCallback, DeployerRequest, ErrorKind, FailureReason,
    Gateway, Operation, Submission,
};
use tokio::sync::mpsc;
use tracing::instrument;
use uuid::Uuid;

/// What became of an inbound callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Result was committed
    Applied,
    /// Correlation id was never issued
    Unknown,
    /// Dispatch was already settled or superseded
    Stale,
}

/// Summary of [`Coordinator::recover`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-flight orders whose callback deadline was re-armed
    pub rearmed: usize,
    /// In-flight orders failed because their deadline passed during downtime
    pub expired: usize,
    /// Pending orders dispatched again
    pub redispatched: usize,
    /// Orders that could not be expired or redispatched; left open
    pub failed: usize,
}

enum Applied {
    Done,
    Next(OrderId),
    Duplicate,
}

pub struct Coordinator {
    registry: Arc<PluginRegistry>,
    gateway: Arc<Gateway>,
    store: Arc<dyn LifecycleStore>,
    policy: Option<Arc<dyn PolicyEvaluator>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<PluginRegistry>,
        gateway: Arc<Gateway>,
        store: Arc<dyn LifecycleStore>,
    ) -> Self {
        Self {
            registry,
            gateway,
            store,
            policy: None,
        }
    }

    /// Gate deploy and modify orders on a policy check of their dry-run plan
    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Create a service instance in `REGISTERED`
    pub async fn register(&self, registration: Registration) -> Result<ServiceInstance> {
        self.registry
            .resolve_for(registration.csp, registration.deployer)?;
        let instance = ServiceInstance::register(registration);
        self.store.insert_instance(instance.clone()).await?;

        tracing::info!(
            service_id = %instance.service_id,
            csp = %instance.csp,
            deployer = %instance.deployer,
            to = %instance.state,
            "Service instance registered"
        );
        Ok(instance)
    }

    /// Accept an order and dispatch it
    ///
    /// Returns as soon as the order is recorded and handed to the deployer;
    /// the terminal state is observed through [`Coordinator::order`] and
    /// [`Coordinator::instance`]. Rejections (order in flight, invalid
    /// transition, unknown plugin) create no order.
    #[instrument(skip(self, request), fields(task = %task))]
    pub async fn execute(
        &self,
        service_id: &str,
        task: TaskType,
        request: OrderRequest,
    ) -> Result<OrderId> {
        let instance = self.load_instance(service_id).await?;

        if task == TaskType::Rollback {
            return Err(LifecycleError::InvalidTransition {
                service_id: service_id.to_string(),
                state: instance.state,
                task,
            });
        }
        if task == TaskType::Migrate {
            let target = request
                .migration
                .as_ref()
                .ok_or_else(|| LifecycleError::MissingMigrationTarget(service_id.to_string()))?;
            self.registry.resolve_for(target.csp, target.deployer)?;
        }
        self.registry.resolve_for(instance.csp, instance.deployer)?;

        let order = LifecycleOrder::new(service_id, task, request);
        let order_id = order.order_id;
        let started = self.store.begin_order(order.clone()).await?;

        tracing::info!(
            service_id = %service_id,
            order_id = %order_id,
            task = %task,
            from = %instance.state,
            to = %started.state,
            "Order accepted"
        );

        if matches!(task, TaskType::Deploy | TaskType::Modify) {
            if let Some(reason) = self.policy_violation(&started, &order).await {
                if let Err(e) = self
                    .apply_outcome(
                        order_id,
                        None,
                        DeployOutcome::Failed {
                            reason,
                            state_document: None,
                        },
                    )
                    .await
                {
                    tracing::error!(order_id = %order_id, error = %e, "Failed to record policy rejection");
                }
                return Ok(order_id);
            }
        }

        // the order is recorded; anything left pending is picked up by recover()
        if let Err(e) = self.drive(order_id).await {
            tracing::error!(order_id = %order_id, error = %e, "Order dispatch failed");
        }
        Ok(order_id)
    }

    /// Deliver a deployer result
    #[instrument(skip(self, outcome), fields(correlation_id = %correlation_id))]
    pub async fn on_callback(
        &self,
        correlation_id: CorrelationId,
        outcome: DeployOutcome,
    ) -> Result<Disposition> {
        let Some(order) = self.store.order_for(correlation_id).await? else {
            tracing::debug!("Discarding callback with unknown correlation id");
            return Ok(Disposition::Unknown);
        };

        match self
            .apply_outcome(order.order_id, Some(correlation_id), outcome)
            .await?
        {
            Applied::Duplicate => Ok(Disposition::Stale),
            Applied::Done => Ok(Disposition::Applied),
            Applied::Next(next) => {
                self.drive(next).await?;
                Ok(Disposition::Applied)
            }
        }
    }

    /// Consume the gateway's callback channel until it closes
    pub async fn run_callbacks(&self, mut callbacks: mpsc::UnboundedReceiver<DeployerCallback>) {
        while let Some(callback) = callbacks.recv().await {
            let correlation_id = callback.correlation_id;
            if let Err(e) = self.on_callback(correlation_id, callback.outcome).await {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Failed to apply deployer callback"
                );
            }
        }
        tracing::debug!("Callback channel closed");
    }

    /// Dry run against the instance's current configuration; creates no order
    pub async fn plan(&self, service_id: &str) -> Result<DeployOutcome> {
        let instance = self.load_instance(service_id).await?;
        if instance.is_deleted() {
            return Err(LifecycleError::InstanceDeleted(service_id.to_string()));
        }

        let operation = if instance.state == DeploymentState::Registered {
            Operation::Deploy
        } else {
            Operation::Modify
        };
        let request = DeployerRequest::new(
            Uuid::nil(),
            service_id,
            operation,
            instance.csp,
            instance.deployer,
        )
        .with_scripts(instance.scripts.clone())
        .with_variables(instance.variables.clone())
        .with_env(self.credential_env(instance.csp, &BTreeMap::new()))
        .with_prior_state(instance.state_document.clone());

        Ok(self.gateway.plan(&request).await)
    }

    /// Resume open orders after a restart
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for order in self.store.open_orders().await? {
            match (order.status, order.correlation_id, order.dispatched_at) {
                (OrderStatus::InFlight, Some(correlation_id), Some(dispatched_at)) => {
                    if self.gateway.rearm(correlation_id, dispatched_at).is_some() {
                        report.rearmed += 1;
                    } else {
                        report.expired += 1;
                        let limit = self.gateway.callback_timeout().as_secs();
                        let expired = DeployOutcome::failed(
                            ErrorKind::Transport,
                            format!("no deployer callback within {limit}s"),
                        );
                        if let Err(e) = self.on_callback(correlation_id, expired).await {
                            report.failed += 1;
                            tracing::error!(
                                order_id = %order.order_id,
                                error = %e,
                                "Failed to expire order during recovery"
                            );
                        }
                    }
                }
                (OrderStatus::Pending, _, _) => {
                    report.redispatched += 1;
                    if let Err(e) = self.drive(order.order_id).await {
                        report.failed += 1;
                        tracing::error!(
                            order_id = %order.order_id,
                            error = %e,
                            "Failed to redispatch order during recovery"
                        );
                    }
                }
                _ => tracing::warn!(
                    order_id = %order.order_id,
                    status = %order.status,
                    "Open order without dispatch record"
                ),
            }
        }

        tracing::info!(
            rearmed = report.rearmed,
            expired = report.expired,
            redispatched = report.redispatched,
            failed = report.failed,
            "Recovered open orders"
        );
        Ok(report)
    }

    pub async fn order(&self, order_id: OrderId) -> Result<LifecycleOrder> {
        self.store
            .order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))
    }

    /// Order a correlation id was issued for
    pub async fn order_for(&self, correlation_id: CorrelationId) -> Result<Option<LifecycleOrder>> {
        self.store.order_for(correlation_id).await
    }

    pub async fn orders_of(&self, service_id: &str) -> Result<Vec<LifecycleOrder>> {
        self.store.orders_of(service_id).await
    }

    pub async fn instance(&self, service_id: &str) -> Result<ServiceInstance> {
        self.load_instance(service_id).await
    }

    async fn load_instance(&self, service_id: &str) -> Result<ServiceInstance> {
        self.store
            .instance(service_id)
            .await?
            .ok_or_else(|| LifecycleError::InstanceNotFound(service_id.to_string()))
    }

    /// Submit pending orders until one is left waiting for a callback
    async fn drive(&self, mut order_id: OrderId) -> Result<()> {
        loop {
            let order = self.order(order_id).await?;
            if order.status != OrderStatus::Pending {
                return Ok(());
            }
            let instance = self.load_instance(&order.service_id).await?;
            let request = self.build_request(&instance, &order);

            let applied = match self.gateway.submit(&request).await {
                Ok(Submission::Pending(handle)) => {
                    tracing::debug!(
                        order_id = %order_id,
                        correlation_id = %handle.correlation_id,
                        deadline = %handle.deadline,
                        "Awaiting deployer callback"
                    );
                    return Ok(());
                }
                Ok(Submission::Immediate {
                    correlation_id,
                    outcome,
                }) => {
                    self.apply_outcome(order_id, Some(correlation_id), outcome)
                        .await?
                }
                // nothing reached the deployer
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, "Could not record dispatch");
                    self.apply_outcome(
                        order_id,
                        None,
                        DeployOutcome::failed(ErrorKind::Transport, e.to_string()),
                    )
                    .await?
                }
            };

            match applied {
                Applied::Next(next) => order_id = next,
                Applied::Done | Applied::Duplicate => return Ok(()),
            }
        }
    }

    /// Reconcile and commit one step result
    async fn apply_outcome(
        &self,
        order_id: OrderId,
        expected_correlation: Option<CorrelationId>,
        outcome: DeployOutcome,
    ) -> Result<Applied> {
        let order = self.order(order_id).await?;
        let awaited = match expected_correlation {
            Some(correlation_id) => order.awaits(correlation_id),
            None => order.status == OrderStatus::Pending,
        };
        if !awaited {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status,
                "Discarding result for a settled or superseded dispatch"
            );
            return Ok(Applied::Duplicate);
        }

        let instance = self.load_instance(&order.service_id).await?;
        let Resolution {
            instance: settled,
            order: finished,
            spawned,
            next,
        } = reconcile::resolve(&self.registry, &instance, &order, outcome);

        let to = settled.state;
        let reason = finished.failure.clone();
        let phase = finished.phase;
        let commit = Commit {
            order: finished,
            instance: settled,
            expected_revision: instance.revision,
            expected_correlation,
            spawned,
        };

        match self.store.commit(commit).await {
            Ok(_) => {}
            Err(LifecycleError::Conflict { reason, .. }) => {
                tracing::debug!(order_id = %order_id, reason = %reason, "Lost commit race");
                return Ok(Applied::Duplicate);
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            service_id = %order.service_id,
            order_id = %order_id,
            task = %order.task_type,
            phase = ?phase,
            from = %instance.state,
            to = %to,
            reason = ?reason,
            "State transition"
        );

        Ok(next.map_or(Applied::Done, Applied::Next))
    }

    /// Dry-run the order and ask the policy evaluator about the plan
    async fn policy_violation(
        &self,
        instance: &ServiceInstance,
        order: &LifecycleOrder,
    ) -> Option<FailureReason> {
        let policy = self.policy.as_ref()?;
        let request = self.build_request(instance, order);

        match self.gateway.plan(&request).await {
            DeployOutcome::Completed { document } => {
                match policy.evaluate(&order.service_id, &document).await {
                    PolicyVerdict::Pass => None,
                    PolicyVerdict::Fail { reason } => {
                        tracing::warn!(
                            service_id = %order.service_id,
                            order_id = %order.order_id,
                            reason = %reason,
                            "Plan rejected by policy"
                        );
                        Some(FailureReason::new(
                            ErrorKind::ScriptInvalid,
                            format!("policy violation: {reason}"),
                        ))
                    }
                }
            }
            DeployOutcome::Failed { reason, .. } => Some(reason),
        }
    }

    fn build_request(&self, instance: &ServiceInstance, order: &LifecycleOrder) -> DeployerRequest {
        let target = match order.phase {
            Some(MigrationPhase::Deploy) => order.request.migration.as_ref(),
            _ => None,
        };
        let (csp, deployer, scripts, base_variables) = match target {
            Some(target) => (
                target.csp,
                target.deployer,
                &target.scripts,
                &target.variables,
            ),
            None => (
                instance.csp,
                instance.deployer,
                &instance.scripts,
                &instance.variables,
            ),
        };

        let operation = match (order.task_type, order.phase) {
            (TaskType::Deploy, _) => Operation::Deploy,
            (TaskType::Modify, _) => Operation::Modify,
            (TaskType::Destroy | TaskType::Rollback | TaskType::Purge, _) => Operation::Destroy,
            (TaskType::Migrate, None | Some(MigrationPhase::Destroy)) => Operation::Destroy,
            (TaskType::Migrate, Some(MigrationPhase::Deploy | MigrationPhase::Compensate)) => {
                Operation::Deploy
            }
        };

        let prior_state = match (order.task_type, order.phase) {
            (TaskType::Migrate, Some(MigrationPhase::Deploy)) => None,
            (TaskType::Rollback, _) | (TaskType::Migrate, Some(MigrationPhase::Compensate)) => order
                .handoff_state
                .clone()
                .or_else(|| instance.state_document.clone()),
            _ => instance.state_document.clone(),
        };

        let mut variables = base_variables.clone();
        variables.extend(order.request.variables.clone());

        DeployerRequest::new(
            order.order_id.as_uuid(),
            &order.service_id,
            operation,
            csp,
            deployer,
        )
        .with_scripts(scripts.clone())
        .with_variables(variables)
        .with_env(self.credential_env(csp, &order.request.env))
        .with_prior_state(prior_state)
    }

    /// Host credentials the plugin asks for, overridden by the order's own env
    fn credential_env(
        &self,
        csp: svcflow_cloud::Csp,
        overrides: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Ok(plugin) = self.registry.resolve(csp) {
            for key in plugin.credential_env() {
                if let Ok(value) = std::env::var(key) {
                    env.insert(key.to_string(), value);
                }
            }
        }
        env.extend(overrides.clone());
        env
    }
}
