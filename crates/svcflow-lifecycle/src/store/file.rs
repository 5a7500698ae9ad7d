//! JSON file store
//!
//! The whole store lives in one JSON document. A sibling `.lock` file keeps a
//! second process from opening the same store. The holder refreshes the lock
//! on every write and periodically while idle, and refuses to write once
//! another process has taken it over. Every write goes to a
//! temporary file first, the previous document is kept as `.backup`, and the
//! temporary file is renamed over the current one.

use super::{Commit, LifecycleStore, STORE_VERSION, StoreDocument};
use crate::error::{LifecycleError, Result};
use crate::instance::ServiceInstance;
use crate::order::{LifecycleOrder, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use svcflow_deployer::CorrelationId;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Locks not refreshed for this long are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// How often a held lock is refreshed while the store sits idle
const LOCK_REFRESH: Duration = Duration::from_secs(10 * 60);

pub struct FileStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
    lock: StoreLock,
}

impl FileStore {
    /// Lock and load the store at `path`, creating it on first write
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
                tracing::debug!("Created store directory: {}", dir.display());
            }
        }

        let lock = StoreLock::acquire(sibling(&path, ".lock")).await?;
        let document = load(&path).await?;

        Ok(Self {
            path,
            document: Mutex::new(document),
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the document, persist it, then publish it
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut StoreDocument) -> Result<T>,
    ) -> Result<T> {
        let mut current = self.document.lock().await;
        let mut next = current.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *current = next;
        Ok(value)
    }

    async fn persist(&self, document: &StoreDocument) -> Result<()> {
        self.lock.refresh().await?;

        let tmp = sibling(&self.path, ".tmp");
        let backup = sibling(&self.path, ".backup");

        let content = serde_json::to_string_pretty(document)?;
        fs::write(&tmp, content).await?;

        if self.path.exists() {
            fs::copy(&self.path, &backup).await?;
        }
        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            instances = document.instances.len(),
            orders = document.orders.len(),
            "Saved lifecycle store"
        );
        Ok(())
    }
}

async fn load(path: &Path) -> Result<StoreDocument> {
    if !path.exists() {
        tracing::debug!("Store file not found, starting empty");
        return Ok(StoreDocument::default());
    }

    let content = fs::read_to_string(path).await?;
    let document: StoreDocument = serde_json::from_str(&content)?;

    if document.version > STORE_VERSION {
        return Err(LifecycleError::StoreVersion {
            found: document.version,
            supported: STORE_VERSION,
        });
    }

    tracing::debug!(
        instances = document.instances.len(),
        orders = document.orders.len(),
        "Loaded lifecycle store"
    );
    Ok(document)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl LifecycleStore for FileStore {
    async fn insert_instance(&self, instance: ServiceInstance) -> Result<()> {
        self.mutate(|doc| doc.insert_instance(instance)).await
    }

    async fn instance(&self, service_id: &str) -> Result<Option<ServiceInstance>> {
        Ok(self.document.lock().await.instances.get(service_id).cloned())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<LifecycleOrder>> {
        Ok(self.document.lock().await.orders.get(&order_id).cloned())
    }

    async fn orders_of(&self, service_id: &str) -> Result<Vec<LifecycleOrder>> {
        Ok(self.document.lock().await.orders_of(service_id))
    }

    async fn open_orders(&self) -> Result<Vec<LifecycleOrder>> {
        Ok(self.document.lock().await.open_orders())
    }

    async fn order_for(&self, correlation_id: CorrelationId) -> Result<Option<LifecycleOrder>> {
        Ok(self.document.lock().await.order_for(correlation_id))
    }

    async fn begin_order(&self, order: LifecycleOrder) -> Result<ServiceInstance> {
        self.mutate(|doc| doc.begin_order(order)).await
    }

    async fn record_dispatch(
        &self,
        order_id: OrderId,
        correlation_id: CorrelationId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mutate(|doc| doc.record_dispatch(order_id, correlation_id, dispatched_at))
            .await
    }

    async fn commit(&self, commit: Commit) -> Result<ServiceInstance> {
        self.mutate(|doc| doc.commit(commit)).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    /// Last time the owning process touched the lock
    #[serde(default)]
    refreshed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    token: Uuid,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
            refreshed_at: None,
            token: Uuid::new_v4(),
        }
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.refreshed_at.unwrap_or(self.acquired_at)
    }

    fn is_stale(&self) -> bool {
        Utc::now().signed_duration_since(self.last_seen()).num_hours() >= STALE_LOCK_HOURS
    }

    fn locked(&self) -> LifecycleError {
        LifecycleError::StoreLocked {
            holder: format!("{} (pid {})", self.holder, self.pid),
            since: self.acquired_at.to_rfc3339(),
        }
    }
}

/// Lock file guard, refreshed while held and removed on drop
struct StoreLock {
    path: PathBuf,
    owner: LockInfo,
    heartbeat: JoinHandle<()>,
}

impl StoreLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        let owner = LockInfo::new();

        if !create_lock(&path, &owner).await? {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(held) if !held.is_stale() => return Err(held.locked()),
                Ok(held) => tracing::warn!("Removing stale store lock from {}", held.holder),
                Err(e) => tracing::warn!("Replacing unreadable store lock: {}", e),
            }
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            // someone else won the takeover
            if !create_lock(&path, &owner).await? {
                let content = fs::read_to_string(&path).await?;
                return Err(serde_json::from_str::<LockInfo>(&content)?.locked());
            }
        }

        let heartbeat = tokio::spawn({
            let path = path.clone();
            let owner = owner.clone();
            async move {
                let mut ticker = tokio::time::interval(LOCK_REFRESH);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = refresh_lock(&path, &owner).await {
                        tracing::warn!("Stopped refreshing store lock: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::debug!("Acquired store lock {}", path.display());
        Ok(Self {
            path,
            owner,
            heartbeat,
        })
    }

    /// Fail if another process took the lock over, otherwise push its staleness out
    async fn refresh(&self) -> Result<()> {
        refresh_lock(&self.path, &self.owner).await
    }
}

/// Create the lock file with its full content, or return false if it exists
async fn create_lock(path: &Path, info: &LockInfo) -> Result<bool> {
    let tmp = sibling(path, &format!(".{}", info.token));
    fs::write(&tmp, serde_json::to_string_pretty(info)?).await?;
    let linked = fs::hard_link(&tmp, path).await;
    fs::remove_file(&tmp).await?;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn refresh_lock(path: &Path, owner: &LockInfo) -> Result<()> {
    let content = fs::read_to_string(path).await?;
    let held: LockInfo = serde_json::from_str(&content)?;
    if held.token != owner.token {
        return Err(held.locked());
    }

    let refreshed = LockInfo {
        refreshed_at: Some(Utc::now()),
        ..owner.clone()
    };
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&refreshed)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.heartbeat.abort();
        // a lock taken over by another process is theirs to remove
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
            .is_some_and(|held| held.token == self.owner.token);
        if ours {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
