//! 🔌 Backends: where definitions come from and where their embeddings go to live.
//!
//! 🎭 The pipeline never learns whether it's talking to RAM or to a pair of NDJSON
//! files on disk. It asks the [`Store`] for pending work and hands it finished
//! vectors. Everything else is the backend's business. Need-to-know basis. 🦆

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::WorkItem;

pub(crate) mod file;
pub(crate) mod in_mem;

pub use file::{FileStore, FileStoreConfig};
pub use in_mem::{InMemoryStore, InMemoryStoreConfig};

/// 🗄️ The persistence collaborator.
///
/// # Contract
/// - `discover_pending` returns up to `limit` items that still lack a stored vector.
///   An item that was dropped or failed last tick shows up again, because it is still pending.
/// - `persist_result` durably stores one vector. Failures come back as errors;
///   the caller logs them and moves on, no retries inside a tick.
/// - `&self` everywhere: the fetcher and the updater hit the store at the same time,
///   so backends bring their own locks.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    async fn discover_pending(&self, limit: usize) -> Result<Vec<WorkItem>>;
    async fn persist_result(&self, item_id: i64, vector: &[f32]) -> Result<()>;
}

/// 📋 Which store to build, straight out of the config file.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    InMemory(InMemoryStoreConfig),
    File(FileStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::InMemory(InMemoryStoreConfig::default())
    }
}

/// 🎭 The many faces of a Store. Enum dispatch, no vtables were harmed.
#[derive(Debug)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    File(FileStore),
}

impl StoreBackend {
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(match config {
            StoreConfig::InMemory(c) => StoreBackend::InMemory(InMemoryStore::from_config(c)),
            StoreConfig::File(c) => StoreBackend::File(FileStore::new(c.clone()).await?),
        })
    }
}

#[async_trait]
impl Store for StoreBackend {
    async fn discover_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        match self {
            StoreBackend::InMemory(s) => s.discover_pending(limit).await,
            StoreBackend::File(s) => s.discover_pending(limit).await,
        }
    }

    async fn persist_result(&self, item_id: i64, vector: &[f32]) -> Result<()> {
        match self {
            StoreBackend::InMemory(s) => s.persist_result(item_id, vector).await,
            StoreBackend::File(s) => s.persist_result(item_id, vector).await,
        }
    }
}
