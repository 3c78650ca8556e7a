//! 🔍 The fetcher: one tick's worth of "anything new?".
//!
//! Asks the store for pending definitions and shoves each into the input queue
//! without waiting. No room means the item sits this tick out; the store still
//! lists it as pending, so the next tick offers it again. Nobody is lost, some are just late.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::backends::Store;
use crate::common::WorkItem;
use crate::progress::PipelineProgress;
use crate::queue::{QueueSender, Rejected};

/// 📊 What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub discovered: usize,
    pub enqueued: usize,
    /// 📦 refused by a full (or closed) queue, back in the pending pile
    pub dropped: usize,
}

/// 🚀 Discover up to `limit` pending items and try to enqueue each of them.
///
/// Never blocks on the queue. A discovery failure is returned as-is for the
/// supervisor to log; nothing gets enqueued in that case.
pub async fn fetch_and_enqueue(
    store: &dyn Store,
    queue: &QueueSender<WorkItem>,
    limit: usize,
    progress: &PipelineProgress,
) -> Result<TickOutcome> {
    let items = store
        .discover_pending(limit)
        .await
        .context("💀 Failed to discover pending definitions")?;
    progress.record_discovered(items.len());

    let mut outcome = TickOutcome {
        discovered: items.len(),
        ..TickOutcome::default()
    };

    let mut items = items.into_iter();
    while let Some(item) = items.next() {
        match queue.try_enqueue(item) {
            Ok(()) => {
                outcome.enqueued += 1;
                progress.record_enqueued();
            }
            Err(Rejected::Full(item)) => {
                outcome.dropped += 1;
                warn!(item_id = item.id, "📦 input queue full, item waits for the next tick");
            }
            Err(Rejected::Closed(item)) => {
                let remaining = 1 + items.len();
                outcome.dropped += remaining;
                warn!(
                    item_id = item.id,
                    remaining, "🔒 input queue closed, dropping the rest of this tick"
                );
                break;
            }
        }
    }
    progress.record_dropped(outcome.dropped);

    debug!(
        discovered = outcome.discovered,
        enqueued = outcome.enqueued,
        dropped = outcome.dropped,
        "🔍 tick done"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::queue;
    use async_trait::async_trait;

    fn five_definitions() -> InMemoryStore {
        InMemoryStore::with_definitions((1..=5).map(|id| WorkItem::new(id, format!("valsi {id}"))))
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn discover_pending(&self, _limit: usize) -> Result<Vec<WorkItem>> {
            anyhow::bail!("connection refused")
        }

        async fn persist_result(&self, _item_id: i64, _vector: &[f32]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn the_one_where_a_full_queue_drops_the_overflow() -> Result<()> {
        let store = five_definitions();
        let progress = PipelineProgress::new();
        let (tx, rx) = queue::bounded(2);

        let outcome = fetch_and_enqueue(&store, &tx, 10, &progress).await?;
        assert_eq!(
            outcome,
            TickOutcome {
                discovered: 5,
                enqueued: 2,
                dropped: 3
            }
        );
        assert_eq!(rx.dequeue().await.map(|item| item.id), Some(1));
        assert_eq!(rx.dequeue().await.map(|item| item.id), Some(2));
        assert_eq!(progress.snapshot().dropped, 3);

        // 🧪 nothing was persisted, so the next tick offers the same items again
        let again = fetch_and_enqueue(&store, &tx, 10, &progress).await?;
        assert_eq!(again.discovered, 5);
        assert_eq!(again.enqueued, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_limit_caps_discovery() -> Result<()> {
        let store = five_definitions();
        let (tx, _rx) = queue::bounded(10);
        let outcome = fetch_and_enqueue(&store, &tx, 3, &PipelineProgress::new()).await?;
        assert_eq!(outcome.discovered, 3);
        assert_eq!(outcome.enqueued, 3);
        assert_eq!(tx.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_closed_queue_drops_everything() -> Result<()> {
        let store = five_definitions();
        let (tx, _rx) = queue::bounded(10);
        tx.close();
        let outcome = fetch_and_enqueue(&store, &tx, 10, &PipelineProgress::new()).await?;
        assert_eq!(outcome.enqueued, 0);
        assert_eq!(outcome.dropped, 5);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_discovery_failure_comes_back_to_the_caller() {
        let (tx, _rx) = queue::bounded(10);
        let err = fetch_and_enqueue(&BrokenStore, &tx, 10, &PipelineProgress::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert!(tx.is_empty());
    }
}
