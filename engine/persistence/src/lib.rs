//! # Persistence Layer
//!
//! Keyed record storage for the casino economy: one wallet record per player
//! and a single global pool record.
//!
//! ## Architecture
//!
//! - **WalletStore**: Abstract trait the engine consumes (get/set semantics per key)
//! - **LocalStore**: One JSON document per wallet under a data directory
//! - **InMemoryStore**: Process-local maps, used by tests and ephemeral runs
//!
//! ## Usage
//!
//! ```rust
//! use persistence::{create_local_store, Wallet, WalletStore};
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let mut store = create_local_store(temp_dir.path())?;
//!     store.initialize().await?;
//!
//!     store.set_wallet(1, &Wallet::default()).await?;
//!     assert_eq!(store.list_wallet_ids().await?, vec![1]);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod local;
pub mod records;

pub use backend::{InMemoryStore, LocalStore, WalletStore};
pub use config::{BackendKind, PersistenceConfig};
pub use error::{PersistenceError, Result};
pub use local::{create_local_store, open_store};
pub use records::{
    ActiveEffect, EffectKind, GameRecord, PityStack, PityState, PlayerId, PoolData, StackSource,
    Upgrades, Wallet, WalletStats,
};

pub use chrono::{DateTime, Utc};
