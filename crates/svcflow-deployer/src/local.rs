//! Local terraform/OpenTofu executor
//!
//! Runs the deployer CLI on this host through `tokio::process`. Each dispatch
//! gets its own workspace directory under the configured root, holding the
//! script set, a `variables.tfvars.json` and (for operations on existing
//! infrastructure) the previous `terraform.tfstate`.
//!
//! `init` and `validate` run before the job is accepted, so broken scripts
//! are reported synchronously; `plan`/`apply`/`destroy` run in a background
//! task that reports through the callback channel.

use crate::error::{DeployerError, Result};
use crate::executor::{CallbackSink, DeployerExecutor, Dispatch};
use crate::outcome::{DeployOutcome, DeployerCallback, ErrorKind, FailureReason};
use crate::request::{CorrelationId, DeployerRequest, Operation};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use svcflow_cloud::DeployerKind;
use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

const VARS_FILE: &str = "variables.tfvars.json";
const STATE_FILE: &str = "terraform.tfstate";
const PLAN_FILE: &str = "tfplan.binary";

/// Captured result of one CLI invocation
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// CLI bound to one workspace directory
#[derive(Debug, Clone)]
struct Workspace {
    binary: PathBuf,
    dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl Workspace {
    /// Run a deployer command and capture its output
    async fn run_command(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.dir)
            .envs(&self.env)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.binary.display(), args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployerError::BinaryNotFound(self.binary.display().to_string())
            } else {
                DeployerError::Io(e)
            }
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn write_files(&self, request: &DeployerRequest) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        for (name, content) in &request.scripts {
            fs::write(self.dir.join(name), content).await?;
        }
        let vars = serde_json::to_string_pretty(&request.variables)?;
        fs::write(self.dir.join(VARS_FILE), vars).await?;
        if let Some(state) = &request.prior_state {
            fs::write(self.dir.join(STATE_FILE), state).await?;
        }
        Ok(())
    }

    /// `init` + `validate`; `Some` is the reason the scripts were refused
    async fn prepare(&self) -> Result<Option<FailureReason>> {
        let init = self.run_command(&["init", "-input=false", "-no-color"]).await?;
        if !init.success {
            return Ok(Some(FailureReason::new(
                ErrorKind::ExecutionFailed,
                first_error(&init.stderr),
            )));
        }

        let validate = self.run_command(&["validate", "-no-color"]).await?;
        if !validate.success {
            return Ok(Some(FailureReason::new(
                ErrorKind::ScriptInvalid,
                first_error(&validate.stderr),
            )));
        }
        Ok(None)
    }

    async fn read_state(&self) -> Option<String> {
        fs::read_to_string(self.dir.join(STATE_FILE)).await.ok()
    }

    async fn run_job(&self, operation: Operation) -> DeployOutcome {
        let var_file = format!("-var-file={VARS_FILE}");
        let steps: Vec<Vec<&str>> = match operation {
            Operation::Deploy | Operation::Modify => vec![
                vec![
                    "plan",
                    "-input=false",
                    "-no-color",
                    var_file.as_str(),
                    "-out",
                    PLAN_FILE,
                ],
                vec!["apply", "-input=false", "-no-color", "-auto-approve", PLAN_FILE],
            ],
            Operation::Destroy => vec![vec![
                "destroy",
                "-input=false",
                "-no-color",
                "-auto-approve",
                var_file.as_str(),
            ]],
        };

        for args in steps {
            match self.run_command(&args).await {
                Ok(output) if output.success => {}
                Ok(output) => {
                    return DeployOutcome::Failed {
                        reason: FailureReason::new(
                            ErrorKind::ExecutionFailed,
                            first_error(&output.stderr),
                        ),
                        state_document: self.read_state().await,
                    };
                }
                Err(e) => return DeployOutcome::failed(ErrorKind::Transport, e.to_string()),
            }
        }

        match self.read_state().await {
            Some(document) => DeployOutcome::Completed { document },
            None => DeployOutcome::failed(
                ErrorKind::Parse,
                format!("{STATE_FILE} was not written by the deployer"),
            ),
        }
    }

    async fn run_plan(&self) -> Result<DeployOutcome> {
        if let Some(reason) = self.prepare().await? {
            return Ok(DeployOutcome::Failed {
                reason,
                state_document: None,
            });
        }

        let var_file = format!("-var-file={VARS_FILE}");
        let plan = self
            .run_command(&[
                "plan",
                "-input=false",
                "-no-color",
                var_file.as_str(),
                "-out",
                PLAN_FILE,
            ])
            .await?;
        if !plan.success {
            return Ok(DeployOutcome::failed(
                ErrorKind::ExecutionFailed,
                first_error(&plan.stderr),
            ));
        }

        let show = self
            .run_command(&["show", "-json", "-no-color", PLAN_FILE])
            .await?;
        if !show.success {
            return Ok(DeployOutcome::failed(
                ErrorKind::ExecutionFailed,
                first_error(&show.stderr),
            ));
        }
        Ok(DeployOutcome::Completed {
            document: show.stdout,
        })
    }
}

/// Executor that shells out to a local terraform or tofu binary
pub struct LocalExecutor {
    kind: DeployerKind,
    binary: PathBuf,
    workspace_root: PathBuf,
}

impl LocalExecutor {
    pub fn new(
        kind: DeployerKind,
        binary: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            binary: binary.into(),
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn workspace(&self, name: &str, request: &DeployerRequest) -> Workspace {
        Workspace {
            binary: self.binary.clone(),
            dir: self.workspace_root.join(name),
            env: request.env.clone(),
        }
    }
}

/// Reject script sets that cannot be laid out in a workspace
fn check_scripts(request: &DeployerRequest) -> Option<String> {
    if request.scripts.is_empty() {
        return Some("script set is empty".to_string());
    }
    request
        .scripts
        .keys()
        .find(|name| {
            name.is_empty()
                || name.contains('/')
                || name.contains('\\')
                || name.as_str() == ".."
                || name.as_str() == "."
        })
        .map(|name| format!("invalid script file name: '{name}'"))
}

/// First `Error:` block of terraform's stderr, or the whole text
fn first_error(stderr: &str) -> String {
    let trimmed = stderr.trim();
    match trimmed.find("Error:") {
        Some(pos) => trimmed[pos..].to_string(),
        None if trimmed.is_empty() => "deployer exited with a failure status".to_string(),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl DeployerExecutor for LocalExecutor {
    fn kind(&self) -> DeployerKind {
        self.kind
    }

    async fn dispatch(
        &self,
        correlation_id: CorrelationId,
        request: &DeployerRequest,
        callbacks: CallbackSink,
    ) -> Result<Dispatch> {
        if let Some(problem) = check_scripts(request) {
            return Ok(Dispatch::Immediate(DeployOutcome::failed(
                ErrorKind::ScriptInvalid,
                problem,
            )));
        }

        let workspace = self.workspace(&correlation_id.to_string(), request);
        workspace.write_files(request).await?;
        if let Some(reason) = workspace.prepare().await? {
            return Ok(Dispatch::Immediate(DeployOutcome::Failed {
                reason,
                state_document: None,
            }));
        }

        let operation = request.operation;
        let service_id = request.service_id.clone();
        tokio::spawn(async move {
            let outcome = workspace.run_job(operation).await;
            tracing::info!(
                service_id = %service_id,
                correlation_id = %correlation_id,
                operation = %operation,
                success = outcome.is_success(),
                "Deployer job finished"
            );

            if outcome.is_success() {
                if let Err(e) = fs::remove_dir_all(&workspace.dir).await {
                    tracing::debug!("Failed to remove workspace {}: {}", workspace.dir.display(), e);
                }
            } else {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    workspace = %workspace.dir.display(),
                    "Keeping workspace of failed job"
                );
            }

            if callbacks
                .send(DeployerCallback {
                    correlation_id,
                    outcome,
                })
                .is_err()
            {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "Callback channel closed, result dropped"
                );
            }
        });

        Ok(Dispatch::Pending)
    }

    async fn plan(&self, request: &DeployerRequest) -> Result<DeployOutcome> {
        if let Some(problem) = check_scripts(request) {
            return Ok(DeployOutcome::failed(ErrorKind::ScriptInvalid, problem));
        }

        let workspace = self.workspace(&format!("plan-{}", Uuid::new_v4()), request);
        workspace.write_files(request).await?;

        let outcome = workspace.run_plan().await;

        if let Err(e) = fs::remove_dir_all(&workspace.dir).await {
            tracing::debug!("Failed to remove plan workspace: {}", e);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scripts: &[(&str, &str)]) -> DeployerRequest {
        DeployerRequest::new(
            Uuid::new_v4(),
            "svc-1",
            Operation::Deploy,
            svcflow_cloud::Csp::Openstack,
            DeployerKind::Terraform,
        )
        .with_scripts(
            scripts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_check_scripts_rejects_paths() {
        assert!(check_scripts(&request(&[])).is_some());
        assert!(check_scripts(&request(&[("../main.tf", "")])).is_some());
        assert!(check_scripts(&request(&[("main.tf", "")])).is_none());
    }

    #[test]
    fn test_first_error_block() {
        let stderr = "\nWarning: something\n\nError: Unsupported argument\n  on main.tf line 3\n";
        assert_eq!(
            first_error(stderr),
            "Error: Unsupported argument\n  on main.tf line 3"
        );
        assert_eq!(first_error("  "), "deployer exited with a failure status");
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(
            DeployerKind::OpenTofu,
            temp_dir.path().join("no-such-tofu"),
            temp_dir.path(),
        );
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let result = executor
            .dispatch(CorrelationId::new(), &request(&[("main.tf", "")]), tx)
            .await;
        assert!(matches!(result, Err(DeployerError::BinaryNotFound(_))));
    }
}
