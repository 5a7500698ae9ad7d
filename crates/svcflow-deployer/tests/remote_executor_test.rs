use std::collections::BTreeMap;
use std::time::Duration;
use svcflow_cloud::{Csp, DeployerKind};
use svcflow_deployer::{
    CorrelationId, DeployOutcome, DeployerExecutor, DeployerRequest, Dispatch, ErrorKind,
    Operation, RemoteConfig, RemoteExecutor,
};
use tokio::sync::mpsc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor(kind: DeployerKind, server: &MockServer) -> RemoteExecutor {
    RemoteExecutor::new(
        kind,
        RemoteConfig {
            base_url: server.uri(),
            callback_base_url: "http://svcflow.internal:8080/webhook/deployer/".to_string(),
            request_timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}

fn request(operation: Operation) -> DeployerRequest {
    let mut scripts = BTreeMap::new();
    scripts.insert("main.tf".to_string(), "resource \"x\" \"y\" {}".to_string());
    DeployerRequest::new(
        Uuid::new_v4(),
        "svc-1",
        operation,
        Csp::HuaweiCloud,
        DeployerKind::Terraform,
    )
    .with_scripts(scripts)
    .with_prior_state(Some("{\"resources\":[]}".to_string()))
}

#[tokio::test]
async fn test_async_deploy_posts_webhook() {
    let server = MockServer::start().await;
    let correlation_id = CorrelationId::new();

    Mock::given(method("POST"))
        .and(path("/terraform-boot/scripts/destroy/async"))
        .and(body_partial_json(serde_json::json!({
            "requestId": correlation_id.to_string(),
            "isPlanOnly": false,
            "tfState": "{\"resources\":[]}",
            "webhookConfig": {
                "url": format!("http://svcflow.internal:8080/webhook/deployer/{correlation_id}"),
                "authType": "NONE"
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatch = executor(DeployerKind::Terraform, &server)
        .dispatch(correlation_id, &request(Operation::Destroy), tx)
        .await
        .unwrap();
    assert!(matches!(dispatch, Dispatch::Pending));
}

#[tokio::test]
async fn test_client_error_is_script_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tofu-maker/scripts/deploy/async"))
        .respond_with(ResponseTemplate::new(400).set_body_string("variable \"flavor\" is required"))
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatch = executor(DeployerKind::OpenTofu, &server)
        .dispatch(CorrelationId::new(), &request(Operation::Deploy), tx)
        .await
        .unwrap();

    match dispatch {
        Dispatch::Immediate(DeployOutcome::Failed { reason, .. }) => {
            assert_eq!(reason.kind, ErrorKind::ScriptInvalid);
            assert!(reason.message.contains("flavor"));
        }
        other => panic!("unexpected dispatch: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terraform-boot/scripts/modify/async"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatch = executor(DeployerKind::Terraform, &server)
        .dispatch(CorrelationId::new(), &request(Operation::Modify), tx)
        .await
        .unwrap();
    assert!(matches!(
        dispatch,
        Dispatch::Immediate(DeployOutcome::Failed { reason, .. }) if reason.kind == ErrorKind::Transport
    ));
}

#[tokio::test]
async fn test_unreachable_service_is_error() {
    // reserve a port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let executor = RemoteExecutor::new(
        DeployerKind::Terraform,
        RemoteConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            callback_base_url: "http://svcflow.internal:8080/webhook/deployer".to_string(),
            request_timeout: Duration::from_secs(5),
        },
    )
    .unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = executor
        .dispatch(CorrelationId::new(), &request(Operation::Deploy), tx)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_plan_is_synchronous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terraform-boot/scripts/plan"))
        .and(body_partial_json(serde_json::json!({"isPlanOnly": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"plan": "{\"format_version\":\"1.2\"}"})),
        )
        .mount(&server)
        .await;

    let outcome = executor(DeployerKind::Terraform, &server)
        .plan(&request(Operation::Deploy))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DeployOutcome::Completed {
            document: "{\"format_version\":\"1.2\"}".to_string()
        }
    );
}
