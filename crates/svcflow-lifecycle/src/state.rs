//! Deployment states and task types

use serde::{Deserialize, Serialize};

/// Canonical deployment status of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Registered,
    Deploying,
    DeploySuccess,
    DeployFailed,
    Modifying,
    ModificationSuccessful,
    ModificationFailed,
    Destroying,
    /// Soft-deleted; no further orders are accepted
    DestroySuccess,
    DestroyFailed,
    Migrating,
    MigrationSuccess,
    MigrationFailed,
    /// Automatic retry is unsafe; only an operator purge is accepted
    ManualCleanupRequired,
    /// Compensation failed; only an operator purge is accepted
    RollbackFailed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Registered => "REGISTERED",
            DeploymentState::Deploying => "DEPLOYING",
            DeploymentState::DeploySuccess => "DEPLOY_SUCCESS",
            DeploymentState::DeployFailed => "DEPLOY_FAILED",
            DeploymentState::Modifying => "MODIFYING",
            DeploymentState::ModificationSuccessful => "MODIFICATION_SUCCESSFUL",
            DeploymentState::ModificationFailed => "MODIFICATION_FAILED",
            DeploymentState::Destroying => "DESTROYING",
            DeploymentState::DestroySuccess => "DESTROY_SUCCESS",
            DeploymentState::DestroyFailed => "DESTROY_FAILED",
            DeploymentState::Migrating => "MIGRATING",
            DeploymentState::MigrationSuccess => "MIGRATION_SUCCESS",
            DeploymentState::MigrationFailed => "MIGRATION_FAILED",
            DeploymentState::ManualCleanupRequired => "MANUAL_CLEANUP_REQUIRED",
            DeploymentState::RollbackFailed => "ROLLBACK_FAILED",
        }
    }

    /// An order is running against the instance
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            DeploymentState::Deploying
                | DeploymentState::Modifying
                | DeploymentState::Destroying
                | DeploymentState::Migrating
        )
    }

    /// Dead end that only an operator purge leaves
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            DeploymentState::ManualCleanupRequired | DeploymentState::RollbackFailed
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeploymentState::DeployFailed
                | DeploymentState::ModificationFailed
                | DeploymentState::DestroyFailed
                | DeploymentState::MigrationFailed
                | DeploymentState::ManualCleanupRequired
                | DeploymentState::RollbackFailed
        )
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of lifecycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Deploy,
    Modify,
    Destroy,
    /// Internal: tears down the leftovers of a failed deploy
    Rollback,
    /// Operator destroy accepted from any settled state
    Purge,
    Migrate,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Deploy => "deploy",
            TaskType::Modify => "modify",
            TaskType::Destroy => "destroy",
            TaskType::Rollback => "rollback",
            TaskType::Purge => "purge",
            TaskType::Migrate => "migrate",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deploy" => Ok(TaskType::Deploy),
            "modify" => Ok(TaskType::Modify),
            "destroy" => Ok(TaskType::Destroy),
            "rollback" => Ok(TaskType::Rollback),
            "purge" => Ok(TaskType::Purge),
            "migrate" => Ok(TaskType::Migrate),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}
