//! Process wiring: config -> registry -> gateway -> store -> coordinator

use anyhow::Context;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use svcflow_cloud::{DeployerKind, PluginRegistry};
use svcflow_cloud_flexibleengine::FlexibleEnginePlugin;
use svcflow_cloud_huaweicloud::HuaweiCloudPlugin;
use svcflow_cloud_openstack::{OpenstackPlugin, ScsPlugin};
use svcflow_config::Config;
use svcflow_deployer::{Gateway, LocalExecutor, RemoteConfig, RemoteExecutor};
use svcflow_lifecycle::{Coordinator, FileStore, OrderId, StoreCorrelations};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Every CSP plugin this build knows about
pub fn registry() -> anyhow::Result<PluginRegistry> {
    Ok(PluginRegistry::builder()
        .register(HuaweiCloudPlugin::new()?)?
        .register(FlexibleEnginePlugin::new()?)?
        .register(OpenstackPlugin::new()?)?
        .register(ScsPlugin::new()?)?
        .build())
}

pub struct Runtime {
    pub coordinator: Arc<Coordinator>,
    callbacks: JoinHandle<()>,
}

impl Runtime {
    /// Open the store, start the callback worker and resume open orders
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let registry = Arc::new(registry()?);
        let store = Arc::new(
            FileStore::open(&config.store.path)
                .await
                .with_context(|| format!("opening store {}", config.store.path.display()))?,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let mut gateway = Gateway::new(
            Arc::new(StoreCorrelations::new(store.clone())),
            tx,
            config.deployer.callback_timeout(),
        );

        match &config.deployer.remote {
            Some(remote) => {
                for kind in [DeployerKind::Terraform, DeployerKind::OpenTofu] {
                    gateway = gateway.with_executor(RemoteExecutor::new(
                        kind,
                        RemoteConfig {
                            base_url: remote.base_url.clone(),
                            callback_base_url: remote.callback_base_url.clone(),
                            request_timeout: remote.request_timeout(),
                        },
                    )?);
                }
                tracing::debug!(base_url = %remote.base_url, "Using remote deployer");
            }
            None => {
                let root = &config.deployer.workspace_root;
                gateway = gateway
                    .with_executor(LocalExecutor::new(
                        DeployerKind::Terraform,
                        &config.deployer.terraform_binary,
                        root,
                    ))
                    .with_executor(LocalExecutor::new(
                        DeployerKind::OpenTofu,
                        &config.deployer.tofu_binary,
                        root,
                    ));
            }
        }

        let coordinator = Arc::new(Coordinator::new(registry, Arc::new(gateway), store));
        let worker = coordinator.clone();
        let callbacks = tokio::spawn(async move { worker.run_callbacks(rx).await });

        coordinator.recover().await?;

        Ok(Self {
            coordinator,
            callbacks,
        })
    }

    /// Block until the order and any follow-up it spawned have finished
    pub async fn wait_idle(&self, service_id: &str, order_id: OrderId) -> anyhow::Result<()> {
        loop {
            let instance = self.coordinator.instance(service_id).await?;
            let order = self.coordinator.order(order_id).await?;
            if instance.active_order.is_none() && !order.is_open() {
                return Ok(());
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
    }

    pub fn shutdown(self) {
        self.callbacks.abort();
    }
}

/// Read every script of a directory (`*.tf`, `*.tf.json`, `*.tfvars`)
pub fn read_scripts(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut scripts = BTreeMap::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file()
            && (name.ends_with(".tf") || name.ends_with(".tf.json") || name.ends_with(".tfvars"))
        {
            scripts.insert(name.to_string(), std::fs::read_to_string(&path)?);
        }
    }
    anyhow::ensure!(!scripts.is_empty(), "no scripts found in {}", dir.display());
    Ok(scripts)
}

/// `key=value` pairs; values that parse as JSON keep their type
pub fn parse_variables(pairs: &[String]) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, raw) = split_pair(pair)?;
            let value = serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

pub fn parse_env(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = split_pair(pair)?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn split_pair(pair: &str) -> anyhow::Result<(&str, &str)> {
    pair.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got {pair:?}"))
}
