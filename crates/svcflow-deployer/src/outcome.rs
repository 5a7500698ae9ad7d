//! Deployer results and the failure taxonomy
//!
//! Every executor, synchronous or not, ends in a [`DeployOutcome`]. Failures
//! are classified into a closed [`ErrorKind`] so the lifecycle engine can
//! decide between `_FAILED`, `MANUAL_CLEANUP_REQUIRED` and retry safety
//! without looking at executor-specific messages.

use crate::error::{DeployerError, Result};
use crate::request::CorrelationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Scripts failed validation before anything ran; never retried
    ScriptInvalid,
    /// Deployer ran and the operation failed
    ExecutionFailed,
    /// Deployer could not be reached or did not answer in time; retry-safe
    Transport,
    /// Deployer reported partial success
    AmbiguousState,
    /// State document is malformed
    Parse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ScriptInvalid => "script_invalid",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Transport => "transport",
            ErrorKind::AmbiguousState => "ambiguous_state",
            ErrorKind::Parse => "parse",
        }
    }

    /// Map an executor-reported kind. Anything unrecognised is an execution failure.
    pub fn from_executor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "script_invalid" | "validation_failed" | "invalid_script" => ErrorKind::ScriptInvalid,
            "transport" | "transport_error" | "timeout" => ErrorKind::Transport,
            "ambiguous_state" | "partial" | "partial_success" => ErrorKind::AmbiguousState,
            "parse" | "parse_error" => ErrorKind::Parse,
            _ => ErrorKind::ExecutionFailed,
        }
    }

    /// Whether the whole order may be resubmitted unchanged
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, ErrorKind::Transport)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrievable reason paired with every terminal failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Normalized result of one deployer operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// Raw document returned by the deployer: the state document for
    /// apply/destroy, the plan JSON for a dry run
    Completed { document: String },
    Failed {
        reason: FailureReason,
        /// State the deployer left behind, if it wrote one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state_document: Option<String>,
    },
}

impl DeployOutcome {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        DeployOutcome::Failed {
            reason: FailureReason::new(kind, message),
            state_document: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Completed { .. })
    }
}

/// Webhook body posted by the deployer process when a job finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployerResult {
    #[serde(default)]
    pub request_id: Option<Uuid>,

    pub command_successful: bool,

    #[serde(default)]
    pub command_std_error: Option<String>,

    #[serde(default)]
    pub terraform_state: Option<String>,

    #[serde(default)]
    pub error_kind: Option<String>,
}

impl DeployerResult {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DeployerError::InvalidCallback(e.to_string()))
    }

    pub fn into_outcome(self) -> DeployOutcome {
        if self.command_successful {
            return match self.terraform_state {
                Some(document) => DeployOutcome::Completed { document },
                None => DeployOutcome::failed(
                    ErrorKind::Parse,
                    "deployer reported success without a state document",
                ),
            };
        }

        let kind = self
            .error_kind
            .as_deref()
            .map(ErrorKind::from_executor)
            .unwrap_or(ErrorKind::ExecutionFailed);
        DeployOutcome::Failed {
            reason: FailureReason::new(
                kind,
                self.command_std_error
                    .unwrap_or_else(|| "deployer reported failure".to_string()),
            ),
            state_document: self.terraform_state,
        }
    }
}

/// Completion event routed back to the lifecycle engine
#[derive(Debug, Clone)]
pub struct DeployerCallback {
    pub correlation_id: CorrelationId,
    pub outcome: DeployOutcome,
}
