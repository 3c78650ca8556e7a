//! 🧵 Workers: the ones who actually do the work while the Supervisor takes
//! all the credit in the sprint retro.
//!
//! 🚀 Two kinds live here. N [`ComputeWorker`]s pull items off the input queue and
//! push results onto the output queue; one [`UpdaterWorker`] drains the output queue
//! into the store. The compute workers live in a [`WorkerPool`], which is the
//! barrier the supervisor waits on before it is allowed to close the output queue. 🦆
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

use crate::progress::PipelineProgress;

mod compute_worker;
mod updater_worker;

pub(crate) use compute_worker::ComputeWorker;
pub(crate) use updater_worker::UpdaterWorker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker: Send + Sized + 'static {
    /// 🔄 The worker's whole life, start to finish.
    fn run(self) -> impl Future<Output = Result<()>> + Send;

    /// 🚀 Spawn it on its own. Returns a JoinHandle because we trust
    /// but verify. Mostly verify. Okay, we don't trust at all.
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

/// 🧾 How the pool's workers ended up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolSummary {
    pub(crate) exited: usize,
    pub(crate) failed: usize,
    pub(crate) panicked: usize,
}

/// 🪦 How one worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Clean,
    Failed,
    Panicked,
}

/// 🏊 A fixed crew of workers behind one join barrier.
///
/// Panics land in the shared progress counters the moment the pool notices
/// them, not just at the end.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: JoinSet<Result<()>>,
    spawned: usize,
    summary: PoolSummary,
    progress: Arc<PipelineProgress>,
}

impl WorkerPool {
    pub(crate) fn new(progress: Arc<PipelineProgress>) -> Self {
        Self {
            workers: JoinSet::new(),
            spawned: 0,
            summary: PoolSummary::default(),
            progress,
        }
    }

    pub(crate) fn spawn<W: Worker>(&mut self, worker: W) {
        self.workers.spawn(worker.run());
        self.spawned += 1;
    }

    pub(crate) fn spawned(&self) -> usize {
        self.spawned
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 🔎 Wait for the next worker to exit and book it. `None` once nobody is left.
    pub(crate) async fn join_next(&mut self) -> Option<WorkerExit> {
        let exit = match self.workers.join_next().await? {
            Ok(Ok(())) => {
                self.summary.exited += 1;
                WorkerExit::Clean
            }
            Ok(Err(err)) => {
                self.summary.failed += 1;
                error!(error = %format!("{err:#}"), "💀 worker exited with an error");
                WorkerExit::Failed
            }
            Err(join_err) if join_err.is_panic() => {
                self.summary.panicked += 1;
                self.progress.record_worker_panic();
                error!(error = %join_err, "💀 worker panicked");
                WorkerExit::Panicked
            }
            Err(join_err) => {
                self.summary.failed += 1;
                error!(error = %join_err, "💀 worker was cancelled");
                WorkerExit::Failed
            }
        };
        Some(exit)
    }

    /// ⏳ Resolves once every worker has exited, however it exited.
    /// A panicked worker is counted and logged, never re-raised.
    pub(crate) async fn wait_all(mut self) -> PoolSummary {
        while self.join_next().await.is_some() {}
        debug!(
            spawned = self.spawned,
            exited = self.summary.exited,
            failed = self.summary.failed,
            panicked = self.summary.panicked,
            "🏁 worker pool drained"
        );
        self.summary
    }
}
