//! svcflow Deployer Gateway
//!
//! Drives an out-of-process terraform/OpenTofu deployer. Short operations
//! (dry-run plans, refused scripts) are answered synchronously; apply and
//! destroy jobs return a pending handle and finish later through a callback
//! matched by correlation id.
//!
//! # Executors
//!
//! - [`LocalExecutor`]: `terraform`/`tofu` CLI on this host
//! - [`RemoteExecutor`]: terraform-boot / tofu-maker HTTP service with webhook callbacks

pub mod error;
pub mod executor;
pub mod gateway;
pub mod local;
pub mod outcome;
pub mod remote;
pub mod request;

// Re-exports
pub use error::{DeployerError, Result};
pub use executor::{CallbackSink, DeployerExecutor, Dispatch};
pub use gateway::{CorrelationStore, Gateway, PendingHandle, Submission};
pub use local::LocalExecutor;
pub use outcome::{DeployOutcome, DeployerCallback, DeployerResult, ErrorKind, FailureReason};
pub use remote::{RemoteConfig, RemoteExecutor};
pub use request::{CorrelationId, DeployerRequest, Operation};
