//! 📚 lsk: the two pieces of a dictionary backend that actually juggle threads.
//!
//! 🧮 A background pipeline that finds definitions without an embedding, computes one
//! on a small pool of workers, and writes it back, then shuts down in a fixed order
//! without leaking a task. See [`supervisors`].
//!
//! 📡 A registry of live clients, each with a mailbox and a one-shot cancel button,
//! poked at safely from many callers at once. See [`broadcaster`].

pub mod app_config;
pub mod backends;
pub mod broadcaster;
pub mod common;
pub mod compute;
pub mod progress;
pub mod queue;
pub mod supervisors;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::broadcaster::Broadcaster;
use crate::compute::SimulatedCompute;
use crate::progress::PipelineReport;
use crate::supervisors::{Supervisor, SupervisorHandle};

/// 🧩 Everything a host process wires its transport to: the running pipeline
/// and the client registry.
#[derive(Debug)]
pub struct Services {
    pub pipeline: SupervisorHandle,
    pub broadcaster: Broadcaster,
}

/// 🏗️ Build the store, the compute and the broadcaster from config and start the
/// pipeline. Returns as soon as everything is up.
///
/// The config is validated here too, so hand-built configs that never went
/// through [`app_config::load_config`] get the same checks.
pub async fn start(app_config: AppConfig, stop: CancellationToken) -> Result<Services> {
    app_config.validate()?;

    let store = StoreBackend::from_config(&app_config.store)
        .await
        .context("💀 Failed to open the store")?;
    let compute = SimulatedCompute::from_config(&app_config.compute);
    let broadcaster = Broadcaster::from_config(&app_config.broadcaster);
    info!(
        workers = app_config.pipeline.worker_count,
        event_buffer = app_config.broadcaster.event_buffer,
        "🧵 starting the embedding pipeline"
    );

    let pipeline =
        Supervisor::new(app_config.pipeline, Arc::new(store), Arc::new(compute)).start(stop);
    Ok(Services {
        pipeline,
        broadcaster,
    })
}

/// 🚀 [`start`], then run until `stop` is cancelled. Any clients still connected
/// at that point have their streams closed. Returns what the pipeline did.
pub async fn run(app_config: AppConfig, stop: CancellationToken) -> Result<PipelineReport> {
    let Services {
        pipeline,
        broadcaster,
    } = start(app_config, stop).await?;

    let report = pipeline.wait().await?;
    let closed = broadcaster.close_all().await;
    info!(closed, "📡 client registry closed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::PipelineConfig;
    use crate::backends::{FileStoreConfig, InMemoryStoreConfig, StoreConfig};
    use crate::broadcaster::{BroadcastError, BroadcasterConfig, Event};
    use crate::common::WorkItem;
    use crate::compute::ComputeConfig;
    use std::time::Duration;

    fn quick_config(store: StoreConfig) -> AppConfig {
        AppConfig {
            pipeline: PipelineConfig {
                tick_interval_ms: 10,
                ..PipelineConfig::default()
            },
            compute: ComputeConfig {
                preprocess_delay_ms: 0,
                compute_delay_ms: 0,
                dimensions: 4,
            },
            store,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_a_file_backed_run_embeds_everything() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("definitions.ndjson");
        let output = dir.path().join("embeddings.ndjson");
        let lines: Vec<String> = (1..=12)
            .map(|id| format!("{{\"id\":{id},\"payload\":\"valsi {id}\"}}"))
            .collect();
        std::fs::write(&input, lines.join("\n"))?;

        let config = quick_config(StoreConfig::File(FileStoreConfig {
            input_file: input.to_string_lossy().into_owned(),
            output_file: output.to_string_lossy().into_owned(),
        }));

        let stop = CancellationToken::new();
        let pipeline = tokio::spawn(run(config, stop.clone()));

        // 🧪 twelve items, ten per tick: needs at least two ticks
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let written = std::fs::read_to_string(&output).unwrap_or_default();
                if written.lines().count() >= 12 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("💀 the output file never filled up");

        stop.cancel();
        let report = pipeline.await??;
        assert!(report.persisted >= 12);
        assert!(report.ticks >= 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_invalid_config_never_starts() {
        let mut config = quick_config(StoreConfig::InMemory(InMemoryStoreConfig {
            definitions: vec![WorkItem::new(1, "coi")],
        }));
        config.pipeline.worker_count = 0;

        let err = run(config, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[tokio::test]
    async fn the_one_where_the_broadcaster_takes_its_buffer_from_config() -> Result<()> {
        let mut config = quick_config(StoreConfig::InMemory(InMemoryStoreConfig::default()));
        config.broadcaster = BroadcasterConfig { event_buffer: 2 };

        let stop = CancellationToken::new();
        let Services {
            pipeline,
            broadcaster,
        } = start(config, stop.clone()).await?;

        let (id, stream, _cancel) = broadcaster.new_client().await;
        broadcaster.broadcast(&id, Event::new("1")).await?;
        broadcaster.broadcast(&id, Event::new("2")).await?;
        assert_eq!(
            broadcaster.broadcast(&id, Event::new("3")).await,
            Err(BroadcastError::SendFailed(id))
        );

        stop.cancel();
        pipeline.wait().await?;
        assert_eq!(stream.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_shutdown_closes_lingering_clients() -> Result<()> {
        let stop = CancellationToken::new();
        let services = start(
            quick_config(StoreConfig::InMemory(InMemoryStoreConfig::default())),
            stop.clone(),
        )
        .await?;
        let (_id, stream, _cancel) = services.broadcaster.new_client().await;
        stop.cancel();

        services.pipeline.wait().await?;
        assert_eq!(services.broadcaster.close_all().await, 1);
        assert!(stream.recv().await.is_err());
        Ok(())
    }
}
