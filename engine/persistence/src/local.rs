//! Local file-based store construction

use crate::backend::{InMemoryStore, LocalStore, WalletStore};
use crate::config::{BackendKind, PersistenceConfig};
use crate::error::Result;

/// Create a new local store with default configuration
pub fn create_local_store(data_dir: impl Into<std::path::PathBuf>) -> Result<LocalStore> {
    LocalStore::with_default_config(data_dir)
}

/// Create and initialize the backend selected by the configuration
pub async fn open_store(config: PersistenceConfig) -> Result<Box<dyn WalletStore>> {
    let mut store: Box<dyn WalletStore> = match config.backend {
        BackendKind::Memory => Box::new(InMemoryStore::new()),
        BackendKind::Local => Box::new(LocalStore::new(config)?),
    };
    store.initialize().await?;
    Ok(store)
}
