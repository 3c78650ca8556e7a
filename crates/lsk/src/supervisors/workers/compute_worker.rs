//! 🧮 ComputeWorker: dequeue, compute, enqueue, repeat, until the input queue runs dry.
//!
//! Exactly one result goes out for every item that comes in, good news or bad.
//! Each computation runs in its own task: a slow one is cut off at the deadline
//! and reported as a timeout, a panicking one is reported as a failure, and the
//! worker moves on to the next item either way.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use super::Worker;
use crate::common::{ComputationResult, WorkItem};
use crate::compute::{Compute, ComputeError};
use crate::progress::PipelineProgress;
use crate::queue::{QueueReceiver, QueueSender};

#[derive(Debug)]
pub(crate) struct ComputeWorker {
    worker_id: usize,
    input: QueueReceiver<WorkItem>,
    output: QueueSender<ComputationResult>,
    compute: Arc<dyn Compute>,
    compute_timeout: Duration,
    progress: Arc<PipelineProgress>,
}

impl ComputeWorker {
    pub(crate) fn new(
        worker_id: usize,
        input: QueueReceiver<WorkItem>,
        output: QueueSender<ComputationResult>,
        compute: Arc<dyn Compute>,
        compute_timeout: Duration,
        progress: Arc<PipelineProgress>,
    ) -> Self {
        Self {
            worker_id,
            input,
            output,
            compute,
            compute_timeout,
            progress,
        }
    }

    async fn process(&self, item: &WorkItem) -> Result<Vec<f32>, ComputeError> {
        let compute = self.compute.clone();
        let payload = item.payload.clone();
        let mut task = tokio::spawn(async move { compute.compute(&payload).await });

        match tokio::time::timeout(self.compute_timeout, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(ComputeError::Failed("computation panicked".to_string()))
            }
            Ok(Err(join_err)) => Err(ComputeError::Failed(join_err.to_string())),
            Err(_elapsed) => {
                task.abort();
                Err(ComputeError::Timeout(self.compute_timeout))
            }
        }
    }
}

impl Worker for ComputeWorker {
    async fn run(self) -> Result<()> {
        let worker_id = self.worker_id;
        debug!(worker_id, "🧮 ComputeWorker started");

        while let Some(item) = self.input.dequeue().await {
            debug!(worker_id, item_id = item.id, "🧮 computing");
            let outcome = self.process(&item).await;
            match &outcome {
                Ok(vector) => {
                    self.progress.record_computed();
                    debug!(worker_id, item_id = item.id, dims = vector.len(), "✅ computed");
                }
                Err(err) => {
                    self.progress.record_compute_failure();
                    warn!(worker_id, item_id = item.id, error = %err, "⚠️ computation failed");
                }
            }

            let result = ComputationResult::new(item.id, worker_id, outcome);
            if let Err(orphan) = self.output.enqueue(result).await {
                bail!(
                    "💀 worker {worker_id}: output queue closed under us, result for item {} lost",
                    orphan.item_id
                );
            }
        }

        debug!(worker_id, "🏁 input queue closed and drained, worker exiting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::SimulatedCompute;
    use crate::queue;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Sloth;

    #[async_trait]
    impl Compute for Sloth {
        async fn compute(&self, _payload: &str) -> Result<Vec<f32>, ComputeError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(vec![0.0])
        }
    }

    /// 💥 Panics on "bad", behaves on everything else.
    #[derive(Debug)]
    struct Touchy;

    #[async_trait]
    impl Compute for Touchy {
        async fn compute(&self, payload: &str) -> Result<Vec<f32>, ComputeError> {
            if payload == "bad" {
                panic!("💥 cannot embed this");
            }
            Ok(vec![1.0])
        }
    }

    fn worker_with(
        compute: Arc<dyn Compute>,
        timeout: Duration,
    ) -> (
        ComputeWorker,
        queue::QueueSender<WorkItem>,
        queue::QueueReceiver<ComputationResult>,
    ) {
        let (in_tx, in_rx) = queue::bounded(8);
        let (out_tx, out_rx) = queue::bounded(8);
        let worker = ComputeWorker::new(
            7,
            in_rx,
            out_tx,
            compute,
            timeout,
            Arc::new(PipelineProgress::new()),
        );
        (worker, in_tx, out_rx)
    }

    #[tokio::test]
    async fn the_one_where_every_item_gets_exactly_one_result() {
        let (worker, in_tx, out_rx) =
            worker_with(Arc::new(SimulatedCompute::instant(3)), Duration::from_secs(1));
        in_tx.try_enqueue(WorkItem::new(1, "klama")).unwrap();
        in_tx.try_enqueue(WorkItem::new(2, "")).unwrap();
        in_tx.close();

        worker.start().await.unwrap().unwrap();

        let first = out_rx.dequeue().await.unwrap();
        assert_eq!(first.item_id, 1);
        assert_eq!(first.worker_id, 7);
        assert_eq!(first.outcome.as_ref().map(Vec::len), Ok(3));

        let second = out_rx.dequeue().await.unwrap();
        assert_eq!(second.outcome, Err(ComputeError::EmptyPayload));
        assert!(out_rx.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_slow_computation_becomes_a_timeout_result() {
        let timeout = Duration::from_millis(50);
        let (worker, in_tx, out_rx) = worker_with(Arc::new(Sloth), timeout);
        in_tx.try_enqueue(WorkItem::new(9, "zgike")).unwrap();
        in_tx.close();

        worker.start().await.unwrap().unwrap();
        let result = out_rx.dequeue().await.unwrap();
        assert_eq!(result.item_id, 9);
        assert_eq!(result.outcome, Err(ComputeError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn the_one_where_a_panicking_computation_is_just_a_failed_result() {
        let (worker, in_tx, out_rx) = worker_with(Arc::new(Touchy), Duration::from_secs(1));
        let progress = worker.progress.clone();
        in_tx.try_enqueue(WorkItem::new(1, "bad")).unwrap();
        in_tx.try_enqueue(WorkItem::new(2, "good")).unwrap();
        in_tx.close();

        // 🧪 the worker itself survives and exits cleanly
        worker.start().await.unwrap().unwrap();

        let first = out_rx.dequeue().await.unwrap();
        assert_eq!(first.item_id, 1);
        assert!(matches!(first.outcome, Err(ComputeError::Failed(_))));
        let second = out_rx.dequeue().await.unwrap();
        assert_eq!(second.item_id, 2);
        assert_eq!(second.outcome, Ok(vec![1.0]));

        let report = progress.snapshot();
        assert_eq!(report.compute_failures, 1);
        assert_eq!(report.computed, 1);
    }

    #[tokio::test]
    async fn the_one_where_a_closed_output_queue_ends_the_worker() {
        let (worker, in_tx, out_rx) =
            worker_with(Arc::new(SimulatedCompute::instant(1)), Duration::from_secs(1));
        drop(out_rx);
        in_tx.try_enqueue(WorkItem::new(3, "ckule")).unwrap();

        // 🧪 the receiver is gone, so the output queue reads as closed
        let err = worker.start().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("item 3"));
    }
}
