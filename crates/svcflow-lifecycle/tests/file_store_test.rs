//! File-backed store: persistence and restart recovery

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use svcflow_cloud::{Csp, DeployerKind, PluginRegistry};
use svcflow_cloud_openstack::OpenstackPlugin;
use svcflow_deployer::{
    CallbackSink, CorrelationId, DeployOutcome, DeployerCallback, DeployerExecutor,
    DeployerRequest, Dispatch, ErrorKind, Gateway,
};
use svcflow_lifecycle::{
    Coordinator, DeploymentState, Disposition, FileStore, OrderRequest, OrderStatus, Registration,
    RecoveryReport, StoreCorrelations, TaskType, TemplateRef,
};
use tempfile::tempdir;
use tokio::sync::mpsc;

struct SilentExecutor;

#[async_trait]
impl DeployerExecutor for SilentExecutor {
    fn kind(&self) -> DeployerKind {
        DeployerKind::OpenTofu
    }

    async fn dispatch(
        &self,
        _correlation_id: CorrelationId,
        _request: &DeployerRequest,
        _callbacks: CallbackSink,
    ) -> svcflow_deployer::Result<Dispatch> {
        Ok(Dispatch::Pending)
    }

    async fn plan(&self, _request: &DeployerRequest) -> svcflow_deployer::Result<DeployOutcome> {
        Ok(DeployOutcome::failed(ErrorKind::Transport, "no plans here"))
    }
}

async fn coordinator(
    path: &Path,
    timeout: Duration,
) -> (Coordinator, mpsc::UnboundedReceiver<DeployerCallback>) {
    let registry = PluginRegistry::builder()
        .register(OpenstackPlugin::new().unwrap())
        .unwrap()
        .build();
    let store = Arc::new(FileStore::open(path).await.unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    let gateway = Gateway::new(Arc::new(StoreCorrelations::new(store.clone())), tx, timeout)
        .with_executor(SilentExecutor);
    (
        Coordinator::new(Arc::new(registry), Arc::new(gateway), store),
        rx,
    )
}

fn registration() -> Registration {
    Registration {
        service_id: "svc-1".to_string(),
        template: TemplateRef::new("postgres", "16"),
        csp: Csp::Openstack,
        deployer: DeployerKind::OpenTofu,
        scripts: BTreeMap::from([("main.tf".to_string(), "# postgres".to_string())]),
        variables: BTreeMap::new(),
    }
}

/// Register and deploy svc-1, leaving the deploy in flight
async fn in_flight_deploy(path: &Path) -> CorrelationId {
    let (coordinator, _rx) = coordinator(path, Duration::from_secs(3600)).await;
    coordinator.register(registration()).await.unwrap();
    let order_id = coordinator
        .execute("svc-1", TaskType::Deploy, OrderRequest::new())
        .await
        .unwrap();
    coordinator
        .order(order_id)
        .await
        .unwrap()
        .correlation_id
        .unwrap()
}

#[tokio::test]
async fn test_callback_after_restart_is_matched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("lifecycle.json");

    let correlation_id = in_flight_deploy(&path).await;
    assert!(path.exists());

    let (coordinator, _rx) = coordinator(&path, Duration::from_secs(3600)).await;
    let report = coordinator.recover().await.unwrap();
    assert_eq!(
        report,
        RecoveryReport {
            rearmed: 1,
            expired: 0,
            redispatched: 0,
            failed: 0,
        }
    );

    let disposition = coordinator
        .on_callback(
            correlation_id,
            DeployOutcome::Completed {
                document: r#"{"version": 4, "resources": []}"#.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Applied);
    assert_eq!(
        coordinator.instance("svc-1").await.unwrap().state,
        DeploymentState::DeploySuccess
    );
}

#[tokio::test]
async fn test_expired_dispatch_fails_on_recovery() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle.json");

    let correlation_id = in_flight_deploy(&path).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (coordinator, _rx) = coordinator(&path, Duration::from_millis(10)).await;
    let report = coordinator.recover().await.unwrap();
    assert_eq!(report.expired, 1);

    let instance = coordinator.instance("svc-1").await.unwrap();
    assert_eq!(instance.state, DeploymentState::DeployFailed);
    assert_eq!(instance.last_failure.unwrap().kind, ErrorKind::Transport);

    let orders = coordinator.orders_of("svc-1").await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Failed);

    // the real callback showing up afterwards changes nothing
    assert_eq!(
        coordinator
            .on_callback(
                correlation_id,
                DeployOutcome::Completed {
                    document: "{}".to_string()
                }
            )
            .await
            .unwrap(),
        Disposition::Stale
    );
}

#[tokio::test]
async fn test_store_keeps_backup_of_previous_document() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle.json");

    let (coordinator, _rx) = coordinator(&path, Duration::from_secs(3600)).await;
    coordinator.register(registration()).await.unwrap();
    coordinator
        .execute("svc-1", TaskType::Deploy, OrderRequest::new())
        .await
        .unwrap();

    let backup = dir.path().join("lifecycle.json.backup");
    assert!(backup.exists());
    let current: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(current["instances"]["svc-1"]["state"], "DEPLOYING");
    assert!(!dir.path().join("lifecycle.json.tmp").exists());
}
