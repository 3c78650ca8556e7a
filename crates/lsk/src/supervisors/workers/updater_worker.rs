//! 🎬 *[an output queue fills with results. somewhere, an updater waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 💾 The UpdaterWorker: patient, tireless, and deeply unbothered by the chaos
//! happening upstream. It receives results. It persists vectors. It asks no questions.
//! There is exactly one of it, so the store only ever sees one writer from the pipeline.
//!
//! ⚠️ It keeps draining until the output queue is closed AND empty. The supervisor
//! only closes that queue after every compute worker is gone, so nothing is left behind.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::Worker;
use crate::backends::Store;
use crate::common::ComputationResult;
use crate::progress::PipelineProgress;
use crate::queue::QueueReceiver;

#[derive(Debug)]
pub(crate) struct UpdaterWorker {
    results: QueueReceiver<ComputationResult>,
    store: Arc<dyn Store>,
    progress: Arc<PipelineProgress>,
}

impl UpdaterWorker {
    pub(crate) fn new(
        results: QueueReceiver<ComputationResult>,
        store: Arc<dyn Store>,
        progress: Arc<PipelineProgress>,
    ) -> Self {
        Self {
            results,
            store,
            progress,
        }
    }
}

impl Worker for UpdaterWorker {
    async fn run(self) -> Result<()> {
        debug!("📥 UpdaterWorker started draining the output queue...");
        while let Some(result) = self.results.dequeue().await {
            let item_id = result.item_id;
            match result.outcome {
                Ok(vector) => match self.store.persist_result(item_id, &vector).await {
                    Ok(()) => {
                        self.progress.record_persisted();
                        debug!(item_id, worker_id = result.worker_id, "💾 persisted");
                    }
                    Err(err) => {
                        // -- no retry; the item is still pending, a later tick picks it up
                        self.progress.record_persist_failure();
                        warn!(item_id, error = %format!("{err:#}"), "⚠️ failed to persist embedding");
                    }
                },
                Err(err) => {
                    // -- the worker already warned; this is the sink's side of the story
                    info!(
                        item_id,
                        worker_id = result.worker_id,
                        error = %err,
                        "⏭️ skipping failed computation, item stays pending"
                    );
                }
            }
        }
        debug!("🏁 UpdaterWorker: output queue closed and drained. Shutting down.");
        Ok(())
    }
}
