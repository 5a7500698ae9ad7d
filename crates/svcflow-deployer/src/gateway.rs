//! Deployer gateway
//!
//! Front door for every deployer call. The gateway:
//!
//! - generates a fresh correlation id per dispatch and persists it through a
//!   [`CorrelationStore`] *before* the executor sees the request, so a
//!   callback arriving after a restart can still be matched
//! - picks the executor for the request's deployer kind
//! - turns executor errors into [`DeployOutcome::Failed`] with
//!   [`ErrorKind::Transport`]
//! - arms a callback deadline for every pending job; when it expires a
//!   synthesized transport failure is pushed down the callback channel
//!
//! Exactly-once handling of callbacks is left to the consumer of that channel.

use crate::error::{DeployerError, Result};
use crate::executor::{CallbackSink, DeployerExecutor, Dispatch};
use crate::outcome::{DeployOutcome, DeployerCallback, ErrorKind};
use crate::request::{CorrelationId, DeployerRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use svcflow_cloud::DeployerKind;
use uuid::Uuid;

/// Durable correlation id -> order mapping
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Record that `order_id` is being dispatched under `correlation_id`
    async fn record_dispatch(
        &self,
        order_id: Uuid,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Accepted job awaiting its callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingHandle {
    pub correlation_id: CorrelationId,
    pub deadline: DateTime<Utc>,
}

/// Result of [`Gateway::submit`]
#[derive(Debug, Clone)]
pub enum Submission {
    Immediate {
        correlation_id: CorrelationId,
        outcome: DeployOutcome,
    },
    Pending(PendingHandle),
}

pub struct Gateway {
    executors: HashMap<DeployerKind, Arc<dyn DeployerExecutor>>,
    correlations: Arc<dyn CorrelationStore>,
    callbacks: CallbackSink,
    callback_timeout: Duration,
}

impl Gateway {
    pub fn new(
        correlations: Arc<dyn CorrelationStore>,
        callbacks: CallbackSink,
        callback_timeout: Duration,
    ) -> Self {
        Self {
            executors: HashMap::new(),
            correlations,
            callbacks,
            callback_timeout,
        }
    }

    /// Register the executor for its deployer kind, replacing any previous one
    pub fn with_executor(mut self, executor: impl DeployerExecutor + 'static) -> Self {
        let kind = executor.kind();
        tracing::debug!(deployer = %kind, "Registered deployer executor");
        self.executors.insert(kind, Arc::new(executor));
        self
    }

    pub fn supports(&self, kind: DeployerKind) -> bool {
        self.executors.contains_key(&kind)
    }

    pub fn callback_timeout(&self) -> Duration {
        self.callback_timeout
    }

    fn executor(&self, kind: DeployerKind) -> Result<&Arc<dyn DeployerExecutor>> {
        self.executors
            .get(&kind)
            .ok_or(DeployerError::ExecutorNotRegistered(kind))
    }

    /// Dispatch an apply/destroy job
    ///
    /// Errors only when the correlation id could not be persisted; nothing
    /// was sent to the deployer in that case.
    pub async fn submit(&self, request: &DeployerRequest) -> Result<Submission> {
        let correlation_id = CorrelationId::new();
        let dispatched_at = Utc::now();
        self.correlations
            .record_dispatch(request.order_id, correlation_id, dispatched_at)
            .await?;

        let dispatch = match self.executor(request.deployer) {
            Ok(executor) => {
                executor
                    .dispatch(correlation_id, request, self.callbacks.clone())
                    .await
            }
            Err(e) => Err(e),
        };

        match dispatch {
            Ok(Dispatch::Pending) => {
                let deadline = self.arm_timeout(correlation_id, self.callback_timeout);
                tracing::info!(
                    service_id = %request.service_id,
                    order_id = %request.order_id,
                    correlation_id = %correlation_id,
                    operation = %request.operation,
                    deployer = %request.deployer,
                    "Deployer job dispatched"
                );
                Ok(Submission::Pending(PendingHandle {
                    correlation_id,
                    deadline,
                }))
            }
            Ok(Dispatch::Immediate(outcome)) => Ok(Submission::Immediate {
                correlation_id,
                outcome,
            }),
            Err(e) => {
                tracing::warn!(
                    service_id = %request.service_id,
                    order_id = %request.order_id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Deployer dispatch failed"
                );
                Ok(Submission::Immediate {
                    correlation_id,
                    outcome: DeployOutcome::failed(ErrorKind::Transport, e.to_string()),
                })
            }
        }
    }

    /// Synchronous dry run
    pub async fn plan(&self, request: &DeployerRequest) -> DeployOutcome {
        let result = match self.executor(request.deployer) {
            Ok(executor) => executor.plan(request).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| DeployOutcome::failed(ErrorKind::Transport, e.to_string()))
    }

    /// Re-arm the deadline of a job dispatched before a restart
    ///
    /// Returns `None` when the deadline has already passed; the caller is
    /// expected to fail that order itself.
    pub fn rearm(
        &self,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let elapsed = Utc::now()
            .signed_duration_since(dispatched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let remaining = self.callback_timeout.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }
        tracing::debug!(
            correlation_id = %correlation_id,
            remaining_secs = remaining.as_secs(),
            "Re-armed callback deadline"
        );
        Some(self.arm_timeout(correlation_id, remaining))
    }

    fn arm_timeout(&self, correlation_id: CorrelationId, after: Duration) -> DateTime<Utc> {
        let sink = self.callbacks.clone();
        let limit = self.callback_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::debug!(correlation_id = %correlation_id, "Callback deadline reached");
            // a late timeout for an already completed job is discarded downstream
            let _ = sink.send(DeployerCallback {
                correlation_id,
                outcome: DeployOutcome::failed(
                    ErrorKind::Transport,
                    format!("no deployer callback within {}s", limit.as_secs()),
                ),
            });
        });
        chrono::Duration::from_std(after)
            .ok()
            .and_then(|after| Utc::now().checked_add_signed(after))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
