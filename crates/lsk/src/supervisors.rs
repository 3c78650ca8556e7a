//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor runs the embedding pipeline:
//!
//! ```text
//!  tick ──► fetcher ──► [input queue] ──► N compute workers ──► [output queue] ──► updater ──► store
//! ```
//!
//! Its life is a small state machine you can watch from the outside:
//! `Starting → Running → ShuttingDown → Stopped`. Shutdown always goes in the same
//! order: close the input queue, wait for every worker to exit, close the output
//! queue, wait for the updater to drain it. The output queue is never closed while
//! a worker could still write to it, because the worker barrier comes first.
//!
//! ⚠️ DO NOT MAKE `workers` PUB EVER
//! 💀 WORKERS ARE THE SUPERVISOR'S PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod fetcher;
mod workers;

pub use fetcher::{TickOutcome, fetch_and_enqueue};

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app_config::PipelineConfig;
use crate::backends::Store;
use crate::common::{ComputationResult, WorkItem};
use crate::compute::Compute;
use crate::progress::{PipelineProgress, PipelineReport};
use crate::queue;
use workers::{ComputeWorker, UpdaterWorker, Worker, WorkerPool};

/// 🚦 Where the supervisor is in its life. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrchestratorState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every tick.
///
/// No globals. Build as many as you like; they don't know about each other.
#[derive(Debug)]
pub struct Supervisor {
    config: PipelineConfig,
    store: Arc<dyn Store>,
    compute: Arc<dyn Compute>,
}

impl Supervisor {
    pub fn new(config: PipelineConfig, store: Arc<dyn Store>, compute: Arc<dyn Compute>) -> Self {
        Self {
            config,
            store,
            compute,
        }
    }

    /// 🚀 Spawn the control loop and hand back a handle right away.
    /// Cancelling `stop` (or calling [`SupervisorHandle::stop`]) begins the shutdown.
    pub fn start(self, stop: CancellationToken) -> SupervisorHandle {
        let (state_tx, state_rx) = watch::channel(OrchestratorState::Starting);
        let progress = Arc::new(PipelineProgress::new());
        let task = tokio::spawn(self.run(stop.clone(), state_tx, progress.clone()));
        SupervisorHandle {
            stop,
            state: state_rx,
            progress,
            task,
        }
    }

    async fn run(
        self,
        stop: CancellationToken,
        state: watch::Sender<OrchestratorState>,
        progress: Arc<PipelineProgress>,
    ) -> PipelineReport {
        // -- 🏗️ Starting
        let (input_tx, input_rx) = queue::bounded::<WorkItem>(self.config.input_capacity);
        let (results_tx, results_rx) =
            queue::bounded::<ComputationResult>(self.config.output_capacity);

        let mut pool = WorkerPool::new(progress.clone());
        for worker_id in 0..self.config.worker_count {
            pool.spawn(ComputeWorker::new(
                worker_id,
                input_rx.clone(),
                results_tx.clone(),
                self.compute.clone(),
                self.config.compute_timeout(),
                progress.clone(),
            ));
        }
        drop(input_rx);
        let updater = UpdaterWorker::new(results_rx, self.store.clone(), progress.clone()).start();

        state.send_replace(OrchestratorState::Running);
        info!(
            workers = pool.spawned(),
            tick_interval_ms = self.config.tick_interval_ms,
            input_capacity = input_tx.capacity(),
            output_capacity = results_tx.capacity(),
            "🚀 supervisor running"
        );

        // -- 🔄 Running
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("🛑 stop requested");
                    break;
                }

                _ = ticker.tick() => {
                    progress.record_tick();
                    if let Err(err) = fetch_and_enqueue(
                        self.store.as_ref(),
                        &input_tx,
                        self.config.discover_limit,
                        &progress,
                    )
                    .await
                    {
                        progress.record_discovery_failure();
                        warn!(error = %format!("{err:#}"), "⚠️ tick failed, trying again next interval");
                    }
                }

                // -- 🪦 a worker only leaves early if something is badly wrong; book it now
                Some(exit) = pool.join_next(), if !pool.is_empty() => {
                    error!(?exit, "💀 a compute worker exited while the pipeline was running");
                }
            }
        }

        // -- 🧹 ShuttingDown
        state.send_replace(OrchestratorState::ShuttingDown);
        input_tx.close();
        debug!(buffered = input_tx.len(), "🔒 input queue closed, workers draining");

        let summary = pool.wait_all().await;
        debug!(?summary, "🧵 every compute worker is gone");

        results_tx.close();
        debug!(buffered = results_tx.len(), "🔒 output queue closed, updater draining");
        match updater.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %format!("{err:#}"), "💀 updater exited with an error"),
            Err(join_err) => {
                progress.record_worker_panic();
                error!(error = %join_err, "💀 updater panicked");
            }
        }

        // -- 🏁 Stopped
        state.send_replace(OrchestratorState::Stopped);
        let report = progress.snapshot();
        info!(
            ticks = report.ticks,
            persisted = report.persisted,
            compute_failures = report.compute_failures,
            worker_panics = report.worker_panics,
            "🏁 supervisor stopped"
        );
        report
    }
}

/// 🎮 The remote control for a running [`Supervisor`].
#[derive(Debug)]
pub struct SupervisorHandle {
    stop: CancellationToken,
    state: watch::Receiver<OrchestratorState>,
    progress: Arc<PipelineProgress>,
    task: JoinHandle<PipelineReport>,
}

impl SupervisorHandle {
    pub fn state(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    /// ⏳ Resolves once the supervisor reaches `target`. Errors if it finished without ever getting there.
    pub async fn wait_for_state(&self, target: OrchestratorState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .with_context(|| format!("💀 supervisor finished without reaching {target:?}"))
    }

    /// 📊 Live counters, mid-flight.
    pub fn progress(&self) -> PipelineReport {
        self.progress.snapshot()
    }

    /// 🛑 Begin the shutdown. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// ⏳ Wait for the control loop to finish on its own (someone else holds the token).
    pub async fn wait(self) -> Result<PipelineReport> {
        self.task.await.context("💀 supervisor task panicked")
    }

    pub async fn shutdown(self) -> Result<PipelineReport> {
        self.stop();
        self.wait().await
    }
}
