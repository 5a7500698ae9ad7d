//! Outcome reconciliation
//!
//! [`resolve`] is a pure function of (instance, order, deployer outcome) to
//! the next instance and order. It parses the returned state document, picks
//! the settled state and decides whether a follow-up step (rollback child,
//! next migration phase) has to run. The coordinator commits the result as
//! one unit.

use crate::instance::ServiceInstance;
use crate::machine;
use crate::order::{LifecycleOrder, MigrationPhase, OrderId};
use crate::state::{DeploymentState, TaskType};
use svcflow_cloud::{Csp, ParsedState, PluginRegistry, StateParser};
use svcflow_deployer::{DeployOutcome, ErrorKind, FailureReason};

/// What to commit after an order step finished
#[derive(Debug, Clone)]
pub struct Resolution {
    pub instance: ServiceInstance,
    pub order: LifecycleOrder,
    /// Newly created follow-up order
    pub spawned: Option<LifecycleOrder>,
    /// Order to dispatch once the commit succeeded
    pub next: Option<OrderId>,
}

enum Verdict {
    Success {
        parsed: ParsedState,
        document: String,
    },
    Failure {
        reason: FailureReason,
        document: Option<String>,
        /// Parse of the state the deployer left behind, if any
        evidence: Option<ParsedState>,
    },
}

/// CSP whose schema the deployer output of this step is written in
pub fn step_csp(instance: &ServiceInstance, order: &LifecycleOrder) -> Csp {
    match (order.phase, &order.request.migration) {
        (Some(MigrationPhase::Deploy), Some(target)) => target.csp,
        _ => instance.csp,
    }
}

fn verdict(
    parser: &StateParser<'_>,
    csp: Csp,
    order: &LifecycleOrder,
    outcome: DeployOutcome,
) -> Verdict {
    match outcome {
        DeployOutcome::Completed { document } => match parser.parse(csp, &document) {
            Ok(parsed) => Verdict::Success { parsed, document },
            Err(e) => {
                tracing::warn!(
                    service_id = %order.service_id,
                    order_id = %order.order_id,
                    error = %e,
                    "Deployer state document could not be parsed"
                );
                Verdict::Failure {
                    reason: FailureReason::new(ErrorKind::Parse, e.to_string()),
                    document: None,
                    evidence: None,
                }
            }
        },
        DeployOutcome::Failed {
            reason,
            state_document,
        } => {
            let evidence = state_document
                .as_deref()
                .and_then(|raw| match parser.parse(csp, raw) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        tracing::warn!(
                            order_id = %order.order_id,
                            error = %e,
                            "Ignoring unparseable state from failed deployer run"
                        );
                        None
                    }
                });
            Verdict::Failure {
                reason,
                document: state_document,
                evidence,
            }
        }
    }
}

/// Reconcile one finished deployer step
pub fn resolve(
    registry: &PluginRegistry,
    instance: &ServiceInstance,
    order: &LifecycleOrder,
    outcome: DeployOutcome,
) -> Resolution {
    let parser = StateParser::new(registry);
    let verdict = verdict(&parser, step_csp(instance, order), order, outcome);

    let mut next = Resolution {
        instance: instance.clone(),
        order: order.clone(),
        spawned: None,
        next: None,
    };

    match order.task_type {
        TaskType::Deploy => resolve_deploy(&mut next, verdict),
        TaskType::Migrate => resolve_migrate(&mut next, verdict),
        task => match verdict {
            Verdict::Success { parsed, document } => {
                if task == TaskType::Modify {
                    let variables = order.request.variables.clone();
                    next.instance.variables.extend(variables);
                }
                next.instance.adopt(parsed, document);
                settle(&mut next, machine::settled(task, true), None);
            }
            Verdict::Failure {
                reason, evidence, ..
            } => {
                let partial =
                    task == TaskType::Destroy && is_partial_teardown(instance, &reason, &evidence);
                let state = if partial {
                    DeploymentState::ManualCleanupRequired
                } else {
                    machine::settled(task, false)
                };
                settle(&mut next, state, Some(reason));
            }
        },
    }

    next
}

fn resolve_deploy(next: &mut Resolution, verdict: Verdict) {
    match verdict {
        Verdict::Success { parsed, document } => {
            next.instance.adopt(parsed, document);
            settle(next, DeploymentState::DeploySuccess, None);
        }
        Verdict::Failure {
            reason,
            document,
            evidence,
        } => {
            let leftovers = evidence.is_some_and(|parsed| !parsed.resources.is_empty());
            if leftovers && reason.kind != ErrorKind::ScriptInvalid {
                let child = LifecycleOrder::rollback_of(&next.order, document);
                next.order.finish(Some(reason.clone()));
                next.instance.last_failure = Some(reason);
                next.instance.active_order = Some(child.order_id);
                next.next = Some(child.order_id);
                next.spawned = Some(child);
            } else {
                settle(next, DeploymentState::DeployFailed, Some(reason));
            }
        }
    }
}

fn resolve_migrate(next: &mut Resolution, verdict: Verdict) {
    let phase = next.order.phase.unwrap_or(MigrationPhase::Destroy);
    match (phase, verdict) {
        (MigrationPhase::Destroy, Verdict::Success { parsed, document }) => {
            next.instance.adopt(parsed, document);
            next.order.advance(MigrationPhase::Deploy);
            next.next = Some(next.order.order_id);
        }
        (MigrationPhase::Destroy, Verdict::Failure { reason, document, .. }) => {
            next.order.failure = Some(reason);
            if document.is_some() {
                next.order.handoff_state = document;
            }
            next.order.advance(MigrationPhase::Compensate);
            next.next = Some(next.order.order_id);
        }
        (MigrationPhase::Deploy, Verdict::Success { parsed, document }) => {
            if let Some(target) = next.order.request.migration.clone() {
                next.instance.csp = target.csp;
                next.instance.deployer = target.deployer;
                next.instance.scripts = target.scripts;
                next.instance.variables = target.variables;
                next.instance
                    .variables
                    .extend(next.order.request.variables.clone());
            }
            next.instance.adopt(parsed, document);
            settle(next, DeploymentState::MigrationSuccess, None);
        }
        (MigrationPhase::Deploy, Verdict::Failure { reason, .. }) => {
            settle(next, DeploymentState::MigrationFailed, Some(reason));
        }
        (MigrationPhase::Compensate, Verdict::Success { parsed, document }) => {
            next.instance.adopt(parsed, document);
            let teardown_failure = next.order.failure.clone();
            settle(next, DeploymentState::MigrationFailed, teardown_failure);
        }
        (MigrationPhase::Compensate, Verdict::Failure { reason, .. }) => {
            settle(next, DeploymentState::RollbackFailed, Some(reason));
        }
    }
}

/// A failed destroy already removed part of the inventory, or says it did
fn is_partial_teardown(
    instance: &ServiceInstance,
    reason: &FailureReason,
    evidence: &Option<ParsedState>,
) -> bool {
    match reason.kind {
        ErrorKind::AmbiguousState => true,
        ErrorKind::ExecutionFailed => evidence
            .as_ref()
            .is_some_and(|parsed| parsed.resources.len() < instance.inventory.len()),
        _ => false,
    }
}

/// Close the order and put the instance in its settled state.
/// A failure state reached without a new reason keeps the previous one.
fn settle(next: &mut Resolution, state: DeploymentState, failure: Option<FailureReason>) {
    next.instance.state = state;
    next.instance.active_order = None;
    if failure.is_some() || !state.is_failure() {
        next.instance.last_failure = failure.clone();
    }
    next.order.finish(failure);
}
