//! 🧠 In-memory store: definitions and embeddings that live exactly as long as the process.
//!
//! Great for tests, great for demos, great for trust issues: it's `Clone`, and every
//! clone peeks at the same `Arc<Mutex<...>>`, so a test can hand one copy to the
//! pipeline and keep another to check what actually landed. ⚠️ Not for production.
//! If you deploy this to prod, please also deploy a therapist.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::backends::Store;
use crate::common::WorkItem;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryStoreConfig {
    /// 📦 definitions to start with; an empty store just idles politely
    #[serde(default)]
    pub definitions: Vec<WorkItem>,
}

#[derive(Debug, Default)]
struct Shelves {
    definitions: BTreeMap<i64, String>,
    embeddings: BTreeMap<i64, Vec<f32>>,
    persist_calls: usize,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    shelves: Arc<Mutex<Shelves>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let definitions = items.into_iter().map(|item| (item.id, item.payload)).collect();
        Self {
            shelves: Arc::new(Mutex::new(Shelves {
                definitions,
                ..Shelves::default()
            })),
        }
    }

    pub fn from_config(config: &InMemoryStoreConfig) -> Self {
        Self::with_definitions(config.definitions.iter().cloned())
    }

    pub async fn insert_definition(&self, item: WorkItem) {
        self.shelves.lock().await.definitions.insert(item.id, item.payload);
    }

    pub async fn embedding(&self, id: i64) -> Option<Vec<f32>> {
        self.shelves.lock().await.embeddings.get(&id).cloned()
    }

    pub async fn persisted_ids(&self) -> Vec<i64> {
        self.shelves.lock().await.embeddings.keys().copied().collect()
    }

    pub async fn pending_count(&self) -> usize {
        let shelves = self.shelves.lock().await;
        shelves
            .definitions
            .keys()
            .filter(|id| !shelves.embeddings.contains_key(*id))
            .count()
    }

    /// 🔢 every `persist_result` that succeeded, rewrites included
    pub async fn persist_calls(&self) -> usize {
        self.shelves.lock().await.persist_calls
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn discover_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        let shelves = self.shelves.lock().await;
        Ok(shelves
            .definitions
            .iter()
            .filter(|(id, _)| !shelves.embeddings.contains_key(*id))
            .take(limit)
            .map(|(id, payload)| WorkItem::new(*id, payload.clone()))
            .collect())
    }

    async fn persist_result(&self, item_id: i64, vector: &[f32]) -> Result<()> {
        let mut shelves = self.shelves.lock().await;
        if !shelves.definitions.contains_key(&item_id) {
            bail!("definition {item_id} does not exist, nothing to attach an embedding to");
        }
        shelves.embeddings.insert(item_id, vector.to_vec());
        shelves.persist_calls += 1;
        Ok(())
    }
}
