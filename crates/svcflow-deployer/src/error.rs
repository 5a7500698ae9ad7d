//! Deployer gateway error types

use svcflow_cloud::DeployerKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("No executor registered for deployer: {0}")]
    ExecutorNotRegistered(DeployerKind),

    #[error("Deployer binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Deployer command failed: {0}")]
    CommandFailed(String),

    #[error("Remote deployer rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to persist correlation id: {0}")]
    Correlation(String),

    #[error("Invalid callback payload: {0}")]
    InvalidCallback(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeployerError>;
