//! Remote deployer executor
//!
//! Talks to a terraform-boot / tofu-maker style HTTP service. Apply and
//! destroy are posted to the service's async endpoints together with a
//! webhook URL (`{callback_base_url}/{correlation_id}`); the service later
//! posts a [`DeployerResult`](crate::DeployerResult) to that URL.

use crate::error::{DeployerError, Result};
use crate::executor::{CallbackSink, DeployerExecutor, Dispatch};
use crate::outcome::{DeployOutcome, ErrorKind};
use crate::request::{CorrelationId, DeployerRequest, Operation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use svcflow_cloud::DeployerKind;

/// Connection settings for a remote deployer service
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the deployer service, e.g. `http://localhost:9090`
    pub base_url: String,

    /// Base URL of our own webhook endpoint
    pub callback_base_url: String,

    pub request_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookConfig {
    url: String,
    auth_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteRequest<'a> {
    request_id: uuid::Uuid,
    is_plan_only: bool,
    script_files: &'a BTreeMap<String, String>,
    variables: &'a BTreeMap<String, serde_json::Value>,
    env_variables: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tf_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_config: Option<WebhookConfig>,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    plan: String,
}

/// Executor backed by a remote deployer service
pub struct RemoteExecutor {
    kind: DeployerKind,
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteExecutor {
    pub fn new(kind: DeployerKind, config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            kind,
            client,
            config,
        })
    }

    fn service_prefix(&self) -> &'static str {
        match self.kind {
            DeployerKind::Terraform => "terraform-boot",
            DeployerKind::OpenTofu => "tofu-maker",
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/scripts/{}",
            self.config.base_url.trim_end_matches('/'),
            self.service_prefix(),
            action
        )
    }

    /// Webhook URL the service calls back on
    pub fn callback_url(&self, correlation_id: CorrelationId) -> String {
        format!(
            "{}/{}",
            self.config.callback_base_url.trim_end_matches('/'),
            correlation_id
        )
    }

    async fn post(&self, url: &str, body: &RemoteRequest<'_>) -> Result<reqwest::Response> {
        tracing::debug!(url = %url, request_id = %body.request_id, "Posting to remote deployer");
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployerError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Turn a refused request into an outcome: 4xx means the service looked at
/// the scripts and refused them, everything else is a transport problem.
fn rejected_outcome(error: DeployerError) -> Result<DeployOutcome> {
    match error {
        DeployerError::Rejected { status, body } if (400..500).contains(&status) => {
            Ok(DeployOutcome::failed(ErrorKind::ScriptInvalid, body))
        }
        DeployerError::Rejected { status, body } => Ok(DeployOutcome::failed(
            ErrorKind::Transport,
            format!("remote deployer returned {status}: {body}"),
        )),
        other => Err(other),
    }
}

#[async_trait]
impl DeployerExecutor for RemoteExecutor {
    fn kind(&self) -> DeployerKind {
        self.kind
    }

    async fn dispatch(
        &self,
        correlation_id: CorrelationId,
        request: &DeployerRequest,
        _callbacks: CallbackSink,
    ) -> Result<Dispatch> {
        let action = match request.operation {
            Operation::Deploy => "deploy/async",
            Operation::Modify => "modify/async",
            Operation::Destroy => "destroy/async",
        };
        let body = RemoteRequest {
            request_id: correlation_id.as_uuid(),
            is_plan_only: false,
            script_files: &request.scripts,
            variables: &request.variables,
            env_variables: &request.env,
            tf_state: request.prior_state.as_deref(),
            webhook_config: Some(WebhookConfig {
                url: self.callback_url(correlation_id),
                auth_type: "NONE",
            }),
        };

        match self.post(&self.endpoint(action), &body).await {
            Ok(_) => Ok(Dispatch::Pending),
            Err(e) => rejected_outcome(e).map(Dispatch::Immediate),
        }
    }

    async fn plan(&self, request: &DeployerRequest) -> Result<DeployOutcome> {
        let body = RemoteRequest {
            request_id: request.order_id,
            is_plan_only: true,
            script_files: &request.scripts,
            variables: &request.variables,
            env_variables: &request.env,
            tf_state: request.prior_state.as_deref(),
            webhook_config: None,
        };

        match self.post(&self.endpoint("plan"), &body).await {
            Ok(response) => {
                let plan: PlanResponse = response.json().await?;
                Ok(DeployOutcome::Completed {
                    document: plan.plan,
                })
            }
            Err(e) => rejected_outcome(e),
        }
    }
}
