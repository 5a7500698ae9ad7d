//! Lifecycle state machine
//!
//! Pure transition rules. Nothing here touches storage; the store applies
//! [`begin`] under its lock and the reconciler picks settled states that
//! [`can_settle`] accepts.

use crate::state::{DeploymentState, TaskType};

/// Why an order cannot start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Another order is running on the instance
    InFlight,
    /// Instance was destroyed
    Deleted,
    /// Task makes no sense from the current state
    NotAllowed,
}

/// In-progress state entered by a task
pub fn in_progress_for(task: TaskType) -> DeploymentState {
    match task {
        TaskType::Deploy | TaskType::Rollback => DeploymentState::Deploying,
        TaskType::Modify => DeploymentState::Modifying,
        TaskType::Destroy | TaskType::Purge => DeploymentState::Destroying,
        TaskType::Migrate => DeploymentState::Migrating,
    }
}

/// Validate starting `task` from `state` and return the in-progress state
pub fn begin(state: DeploymentState, task: TaskType) -> Result<DeploymentState, Rejection> {
    if state.is_in_progress() {
        return Err(Rejection::InFlight);
    }
    if state == DeploymentState::DestroySuccess {
        return Err(Rejection::Deleted);
    }

    let allowed = match (state, task) {
        // rollback orders are only ever spawned by a failed deploy
        (_, TaskType::Rollback) => false,
        (DeploymentState::ManualCleanupRequired | DeploymentState::RollbackFailed, task) => {
            task == TaskType::Purge
        }
        // nothing exists yet to modify, destroy or move
        (DeploymentState::Registered, task) => task == TaskType::Deploy,
        _ => true,
    };

    if allowed {
        Ok(in_progress_for(task))
    } else {
        Err(Rejection::NotAllowed)
    }
}

/// Plain settled state for a finished task
pub fn settled(task: TaskType, success: bool) -> DeploymentState {
    match (task, success) {
        (TaskType::Deploy, true) => DeploymentState::DeploySuccess,
        (TaskType::Deploy, false) => DeploymentState::DeployFailed,
        (TaskType::Modify, true) => DeploymentState::ModificationSuccessful,
        (TaskType::Modify, false) => DeploymentState::ModificationFailed,
        (TaskType::Destroy, true) => DeploymentState::DestroySuccess,
        (TaskType::Destroy, false) => DeploymentState::DestroyFailed,
        (TaskType::Purge, true) => DeploymentState::DestroySuccess,
        (TaskType::Purge, false) => DeploymentState::ManualCleanupRequired,
        // the deploy already failed; rollback only decides how badly
        (TaskType::Rollback, true) => DeploymentState::DeployFailed,
        (TaskType::Rollback, false) => DeploymentState::RollbackFailed,
        (TaskType::Migrate, true) => DeploymentState::MigrationSuccess,
        (TaskType::Migrate, false) => DeploymentState::MigrationFailed,
    }
}

/// Whether an in-progress state may move to `to` when an order completes.
/// Staying in progress is allowed while a follow-up phase runs.
pub fn can_settle(from: DeploymentState, to: DeploymentState) -> bool {
    use DeploymentState::*;
    match from {
        Deploying => matches!(to, Deploying | DeploySuccess | DeployFailed | RollbackFailed),
        Modifying => matches!(to, ModificationSuccessful | ModificationFailed),
        Destroying => matches!(to, DestroySuccess | DestroyFailed | ManualCleanupRequired),
        Migrating => matches!(
            to,
            Migrating | MigrationSuccess | MigrationFailed | RollbackFailed
        ),
        _ => false,
    }
}
