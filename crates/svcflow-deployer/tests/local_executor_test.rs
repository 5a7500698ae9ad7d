#![cfg(unix)]

use serial_test::serial;
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use svcflow_cloud::{Csp, DeployerKind};
use svcflow_deployer::{
    CorrelationId, DeployOutcome, DeployerExecutor, DeployerRequest, Dispatch, ErrorKind,
    LocalExecutor, Operation,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Stand-in for the terraform CLI: answers each subcommand from the workspace
const FAKE_TERRAFORM: &str = r#"#!/bin/sh
case "$1" in
  init)
    exit 0 ;;
  validate)
    if grep -q BROKEN ./*.tf; then
      echo "Error: Unsupported block type" >&2
      exit 1
    fi
    exit 0 ;;
  plan)
    : > tfplan.binary
    exit 0 ;;
  apply)
    printf '%s' '{"version":4,"resources":[{"mode":"managed","type":"openstack_compute_instance_v2","name":"vm","instances":[{"attributes":{"id":"vm-1","name":"web"}}]}]}' > terraform.tfstate
    exit 0 ;;
  destroy)
    echo "Error: timeout while waiting for server to be deleted" >&2
    exit 1 ;;
  show)
    echo '{"format_version":"1.2","planned_values":{"root_module":{}}}'
    exit 0 ;;
esac
exit 2
"#;

fn install_fake_terraform(dir: &Path) -> PathBuf {
    let bin = dir.join("terraform");
    std::fs::write(&bin, FAKE_TERRAFORM).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

fn request(operation: Operation, main_tf: &str) -> DeployerRequest {
    let mut scripts = BTreeMap::new();
    scripts.insert("main.tf".to_string(), main_tf.to_string());
    let mut variables = BTreeMap::new();
    variables.insert("flavor".to_string(), serde_json::json!("s3.large.2"));

    DeployerRequest::new(
        Uuid::new_v4(),
        "svc-1",
        operation,
        Csp::Openstack,
        DeployerKind::Terraform,
    )
    .with_scripts(scripts)
    .with_variables(variables)
}

#[tokio::test]
#[serial]
async fn test_deploy_reports_state_through_callback() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bin = install_fake_terraform(temp_dir.path());
    let root = temp_dir.path().join("workspaces");
    let executor = LocalExecutor::new(DeployerKind::Terraform, bin, &root);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let correlation_id = CorrelationId::new();
    let dispatch = executor
        .dispatch(
            correlation_id,
            &request(Operation::Deploy, "resource \"x\" \"y\" {}"),
            tx,
        )
        .await
        .unwrap();
    assert!(matches!(dispatch, Dispatch::Pending));

    let callback = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(callback.correlation_id, correlation_id);
    match callback.outcome {
        DeployOutcome::Completed { document } => assert!(document.contains("vm-1")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // successful workspaces are cleaned up
    assert!(!root.join(correlation_id.to_string()).exists());
}

#[tokio::test]
#[serial]
async fn test_invalid_scripts_rejected_synchronously() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bin = install_fake_terraform(temp_dir.path());
    let executor = LocalExecutor::new(DeployerKind::Terraform, bin, temp_dir.path());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatch = executor
        .dispatch(
            CorrelationId::new(),
            &request(Operation::Deploy, "BROKEN {"),
            tx,
        )
        .await
        .unwrap();

    match dispatch {
        Dispatch::Immediate(DeployOutcome::Failed { reason, .. }) => {
            assert_eq!(reason.kind, ErrorKind::ScriptInvalid);
            assert!(reason.message.contains("Unsupported block type"));
        }
        other => panic!("unexpected dispatch: {other:?}"),
    }
    // nothing was spawned, so the sender is gone
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
#[serial]
async fn test_failed_destroy_returns_remaining_state() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bin = install_fake_terraform(temp_dir.path());
    let root = temp_dir.path().join("workspaces");
    let executor = LocalExecutor::new(DeployerKind::Terraform, bin, &root);

    let prior = r#"{"version":4,"resources":[]}"#;
    let request =
        request(Operation::Destroy, "resource \"x\" \"y\" {}").with_prior_state(Some(prior.into()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let correlation_id = CorrelationId::new();
    executor.dispatch(correlation_id, &request, tx).await.unwrap();

    let callback = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match callback.outcome {
        DeployOutcome::Failed {
            reason,
            state_document,
        } => {
            assert_eq!(reason.kind, ErrorKind::ExecutionFailed);
            assert!(reason.message.starts_with("Error: timeout"));
            assert_eq!(state_document.as_deref(), Some(prior));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // failed workspaces are kept for inspection
    assert!(root.join(correlation_id.to_string()).join("main.tf").exists());
}

#[tokio::test]
#[serial]
async fn test_plan_returns_plan_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bin = install_fake_terraform(temp_dir.path());
    let executor = LocalExecutor::new(DeployerKind::Terraform, bin, temp_dir.path());

    let outcome = executor
        .plan(&request(Operation::Deploy, "resource \"x\" \"y\" {}"))
        .await
        .unwrap();
    match outcome {
        DeployOutcome::Completed { document } => {
            let plan: serde_json::Value = serde_json::from_str(&document).unwrap();
            assert_eq!(plan["format_version"], "1.2");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
