// ai
//! 📂 File store: definitions from one NDJSON file, embeddings appended to another.
//!
//! Input lines look like `{"id":1,"payload":"..."}`. Output lines look like
//! `{"id":1,"embedding":[0.1,0.2]}`. On startup the output file is read back, so a
//! definition that already has a line there is not pending anymore. Kill the
//! process, start it again, and it picks up where it left off. Like a good podcast. 🎧
//!
//! 🚰 input.ndjson → BTreeMap → discover_pending → ... → persist_result → BufWriter → output.ndjson
//! 💀 Disk full → your problem now
//! 🦆 (mandatory, no notes)

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backends::Store;
use crate::common::WorkItem;

#[derive(Debug, Deserialize, Clone)]
pub struct FileStoreConfig {
    /// 📖 NDJSON definitions, one `{"id","payload"}` per line
    pub input_file: String,
    /// ✍️ NDJSON embeddings, appended to, never truncated
    pub output_file: String,
}

// -- 📝 one output line on the way out; borrows the vector, no copy
#[derive(Serialize)]
struct EmbeddingLine<'a> {
    id: i64,
    embedding: &'a [f32],
}

// -- 📖 one output line on the way back in; only the id matters for resume
#[derive(Deserialize)]
struct PersistedLine {
    id: i64,
}

#[derive(Debug)]
struct Ledger {
    definitions: BTreeMap<i64, String>,
    done: BTreeSet<i64>,
    out: BufWriter<File>,
}

#[derive(Debug)]
pub struct FileStore {
    ledger: Mutex<Ledger>,
    config: FileStoreConfig,
}

impl FileStore {
    /// 🚀 Loads the definitions, replays the output file to learn what's done,
    /// then opens the output in append mode.
    pub async fn new(config: FileStoreConfig) -> Result<Self> {
        let definitions = read_definitions(Path::new(&config.input_file)).await?;
        let (done, torn_tail) = read_done_ids(Path::new(&config.output_file)).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.output_file)
            .await
            .with_context(|| {
                format!(
                    "💀 The output file '{}' refused to open for appending. \
                     The parent directory may not exist, or it may simply not like us.",
                    config.output_file
                )
            })?;
        if torn_tail {
            // -- 🩹 start fresh lines after a crash left half of one behind
            file.write_all(b"\n")
                .await
                .context("💀 Failed to patch the torn tail of the output file")?;
        }

        info!(
            input_file = %config.input_file,
            output_file = %config.output_file,
            definitions = definitions.len(),
            already_done = done.len(),
            "📂 file store ready"
        );

        Ok(Self {
            ledger: Mutex::new(Ledger {
                definitions,
                done,
                out: BufWriter::new(file),
            }),
            config,
        })
    }

    pub fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    pub async fn done_count(&self) -> usize {
        self.ledger.lock().await.done.len()
    }
}

async fn read_definitions(path: &Path) -> Result<BTreeMap<i64, String>> {
    let raw = tokio::fs::read_to_string(path).await.with_context(|| {
        format!(
            "💀 Could not read the definitions file '{}'. We looked. It did not look back.",
            path.display()
        )
    })?;

    let mut definitions = BTreeMap::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: WorkItem = serde_json::from_str(line).with_context(|| {
            format!(
                "💀 Line {} of '{}' is not a {{\"id\",\"payload\"}} object",
                idx + 1,
                path.display()
            )
        })?;
        definitions.insert(item.id, item.payload);
    }
    Ok(definitions)
}

/// 📖 Ids already in the output file, plus whether its last line lacks a newline.
async fn read_done_ids(path: &Path) -> Result<(BTreeSet<i64>, bool)> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok((BTreeSet::new(), false));
    }
    let raw = tokio::fs::read_to_string(path).await.with_context(|| {
        format!("💀 Could not replay the output file '{}'", path.display())
    })?;

    let mut done = BTreeSet::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PersistedLine>(line) {
            Ok(persisted) => {
                done.insert(persisted.id);
            }
            // -- ⚠️ a torn last line from a crash mid-write; that item is simply pending again
            Err(err) => warn!(
                line = idx + 1,
                output_file = %path.display(),
                error = %err,
                "⚠️ skipping unreadable output line"
            ),
        }
    }
    let torn_tail = !raw.is_empty() && !raw.ends_with('\n');
    Ok((done, torn_tail))
}

#[async_trait]
impl Store for FileStore {
    async fn discover_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .definitions
            .iter()
            .filter(|(id, _)| !ledger.done.contains(*id))
            .take(limit)
            .map(|(id, payload)| WorkItem::new(*id, payload.clone()))
            .collect())
    }

    async fn persist_result(&self, item_id: i64, vector: &[f32]) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.definitions.contains_key(&item_id) {
            bail!("definition {item_id} is not in the input file");
        }

        let mut line = serde_json::to_string(&EmbeddingLine {
            id: item_id,
            embedding: vector,
        })
        .context("💀 Failed to serialize an embedding line")?;
        line.push('\n');

        ledger
            .out
            .write_all(line.as_bytes())
            .await
            .context("💀 Failed to append to the output file")?;
        ledger
            .out
            .flush()
            .await
            .context("💀 Failed to flush the output file")?;
        ledger.done.insert(item_id);
        debug!(item_id, "💾 embedding appended");
        Ok(())
    }
}
