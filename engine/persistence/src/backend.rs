//! Wallet store trait and implementations

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use crate::records::{PlayerId, PoolData, Wallet};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Keyed record store consumed by the engine.
///
/// Implementations must make a single `set_*` call atomic per key; the engine
/// serialises read-modify-write cycles of one wallet itself.
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
    /// Prepare the backend (create directories, open handles)
    async fn initialize(&mut self) -> Result<()>;

    /// Load a wallet, `None` if the player has never been seen
    async fn get_wallet(&self, id: PlayerId) -> Result<Option<Wallet>>;

    /// Replace a wallet
    async fn set_wallet(&self, id: PlayerId, wallet: &Wallet) -> Result<()>;

    /// Load the pool record, zeroed if it has never been written
    async fn get_pool(&self) -> Result<PoolData>;

    /// Replace the pool record
    async fn set_pool(&self, pool: &PoolData) -> Result<()>;

    /// Every wallet id known to the store
    async fn list_wallet_ids(&self) -> Result<Vec<PlayerId>>;

    /// Best-effort display name lookup
    async fn resolve_display_name(&self, id: PlayerId) -> Result<String>;
}

/// Local file-based store: one JSON document per wallet plus `pool.json`
pub struct LocalStore {
    config: PersistenceConfig,
    initialized: bool,
}

impl LocalStore {
    /// Create a new local store
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        config.validate().map_err(PersistenceError::config)?;
        Ok(Self { config, initialized: false })
    }

    /// Create a new local store with default config
    pub fn with_default_config(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(PersistenceConfig::new(data_dir))
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }

    fn wallet_path(&self, id: PlayerId) -> PathBuf {
        self.config.wallets_dir().join(format!("{id}.json"))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized {
            return Err(PersistenceError::invalid_operation("Local store not initialized"));
        }
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    PersistenceError::corruption(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = if self.config.pretty_json {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        // Write to a sibling temp file and rename so readers never observe a torn record
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            if self.config.fsync_every_write {
                file.sync_all().await?;
            }
        }
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WalletStore for LocalStore {
    async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        tokio::fs::create_dir_all(self.config.wallets_dir()).await?;
        self.initialized = true;

        tracing::info!("Local wallet store initialized at: {:?}", self.config.data_dir);
        Ok(())
    }

    async fn get_wallet(&self, id: PlayerId) -> Result<Option<Wallet>> {
        self.ensure_initialized()?;
        Self::read_json(&self.wallet_path(id)).await
    }

    async fn set_wallet(&self, id: PlayerId, wallet: &Wallet) -> Result<()> {
        self.ensure_initialized()?;
        self.write_json(&self.wallet_path(id), wallet).await
    }

    async fn get_pool(&self) -> Result<PoolData> {
        self.ensure_initialized()?;
        Ok(Self::read_json(&self.config.pool_path()).await?.unwrap_or_default())
    }

    async fn set_pool(&self, pool: &PoolData) -> Result<()> {
        self.ensure_initialized()?;
        self.write_json(&self.config.pool_path(), pool).await
    }

    async fn list_wallet_ids(&self) -> Result<Vec<PlayerId>> {
        self.ensure_initialized()?;

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(self.config.wallets_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).map(str::parse::<PlayerId>) {
                Some(Ok(id)) => ids.push(id),
                _ => tracing::warn!("Ignoring unexpected file in wallet store: {:?}", path),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn resolve_display_name(&self, id: PlayerId) -> Result<String> {
        self.ensure_initialized()?;
        self.get_wallet(id)
            .await?
            .and_then(|w| w.display_name)
            .ok_or(PersistenceError::NameUnavailable(id))
    }
}

/// In-memory store (for testing and ephemeral deployments)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    wallets: Arc<Mutex<HashMap<PlayerId, Wallet>>>,
    pool: Arc<Mutex<PoolData>>,
    names: Arc<Mutex<HashMap<PlayerId, String>>>,
    stale_ids: Arc<Mutex<HashSet<PlayerId>>>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name for a player
    pub async fn set_display_name(&self, id: PlayerId, name: impl Into<String>) {
        self.names.lock().await.insert(id, name.into());
    }

    /// List an id whose record can no longer be resolved; lookups for it fail
    pub async fn add_stale_id(&self, id: PlayerId) {
        self.stale_ids.lock().await.insert(id);
    }

    /// Number of stored wallets
    pub async fn wallet_count(&self) -> usize {
        self.wallets.lock().await.len()
    }
}

#[async_trait::async_trait]
impl WalletStore for InMemoryStore {
    async fn initialize(&mut self) -> Result<()> {
        tracing::info!("In-memory wallet store initialized");
        Ok(())
    }

    async fn get_wallet(&self, id: PlayerId) -> Result<Option<Wallet>> {
        if self.stale_ids.lock().await.contains(&id) {
            return Err(PersistenceError::WalletNotFound(id));
        }
        Ok(self.wallets.lock().await.get(&id).cloned())
    }

    async fn set_wallet(&self, id: PlayerId, wallet: &Wallet) -> Result<()> {
        if self.stale_ids.lock().await.contains(&id) {
            return Err(PersistenceError::WalletNotFound(id));
        }
        self.wallets.lock().await.insert(id, wallet.clone());
        Ok(())
    }

    async fn get_pool(&self) -> Result<PoolData> {
        Ok(self.pool.lock().await.clone())
    }

    async fn set_pool(&self, pool: &PoolData) -> Result<()> {
        *self.pool.lock().await = pool.clone();
        Ok(())
    }

    async fn list_wallet_ids(&self) -> Result<Vec<PlayerId>> {
        let mut ids: Vec<PlayerId> = self.wallets.lock().await.keys().copied().collect();
        ids.extend(self.stale_ids.lock().await.iter().copied());
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn resolve_display_name(&self, id: PlayerId) -> Result<String> {
        if let Some(name) = self.names.lock().await.get(&id) {
            return Ok(name.clone());
        }
        self.wallets
            .lock()
            .await
            .get(&id)
            .and_then(|w| w.display_name.clone())
            .ok_or(PersistenceError::NameUnavailable(id))
    }
}
