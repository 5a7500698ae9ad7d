//! Executor abstraction
//!
//! An executor is one way of running terraform/OpenTofu: a local CLI on this
//! host or a remote deployer service reached over HTTP.

use crate::error::Result;
use crate::outcome::{DeployOutcome, DeployerCallback};
use crate::request::{CorrelationId, DeployerRequest};
use async_trait::async_trait;
use svcflow_cloud::DeployerKind;
use tokio::sync::mpsc;

/// Channel on which completed jobs are reported
pub type CallbackSink = mpsc::UnboundedSender<DeployerCallback>;

/// What an executor did with a request
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Finished (or was rejected) before returning
    Immediate(DeployOutcome),
    /// Accepted; the outcome arrives later as a callback for the correlation id
    Pending,
}

#[async_trait]
pub trait DeployerExecutor: Send + Sync {
    /// Deployer kind this executor runs
    fn kind(&self) -> DeployerKind;

    /// Start an apply/destroy job
    ///
    /// An `Err` means the deployer could not be reached at all.
    async fn dispatch(
        &self,
        correlation_id: CorrelationId,
        request: &DeployerRequest,
        callbacks: CallbackSink,
    ) -> Result<Dispatch>;

    /// Dry run, answered synchronously with the plan JSON
    async fn plan(&self, request: &DeployerRequest) -> Result<DeployOutcome>;
}
