//! 📦 Common data structures: the two slips of paper this whole factory shuffles around.
//!
//! A [`WorkItem`] goes in one end ("please embed this definition"). A
//! [`ComputationResult`] comes out the other ("here's your vector", or "here's why not").
//! Ownership moves through the queues. Nobody shares. Nobody clones on the hot path.
//! It is the most well-behaved kindergarten class in the crate. 🦆

use serde::{Deserialize, Serialize};

use crate::compute::ComputeError;

/// 🎯 One definition that still needs its embedding.
///
/// Produced by the fetcher, owned by exactly one worker at a time.
/// Immutable after creation, which is more than can be said for most definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub payload: String,
}

impl WorkItem {
    pub fn new(id: i64, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// 📬 The result slip a worker hands back for exactly one [`WorkItem`].
///
/// Failures ride along inside `outcome` instead of blowing up the worker.
/// One bad definition does not get to ruin everyone's afternoon.
#[derive(Debug)]
pub struct ComputationResult {
    pub item_id: i64,
    /// 🧵 which worker did the job, for the logs and for blame
    pub worker_id: usize,
    pub outcome: Result<Vec<f32>, ComputeError>,
}

impl ComputationResult {
    pub(crate) fn new(
        item_id: i64,
        worker_id: usize,
        outcome: Result<Vec<f32>, ComputeError>,
    ) -> Self {
        Self {
            item_id,
            worker_id,
            outcome,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
