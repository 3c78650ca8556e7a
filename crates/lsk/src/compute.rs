//! 🧮 Compute: the opaque "turn text into numbers" step.
//!
//! What the numbers *mean* is somebody else's PhD. This module only promises the
//! shape: a payload goes in, a `Vec<f32>` (or a [`ComputeError`]) comes out.
//! The capability is a trait so tests can swap in something deterministic and fast,
//! and production can swap in something expensive and slow. Circle of life. 🦆

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

/// 💀 Item-level failures. They travel inside a result; they never take a worker down.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    #[error("payload is empty, nothing to embed")]
    EmptyPayload,
    #[error("computation exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("computation failed: {0}")]
    Failed(String),
}

/// 🔄 The injected capability: `compute(payload) -> vector`.
#[async_trait]
pub trait Compute: std::fmt::Debug + Send + Sync {
    async fn compute(&self, payload: &str) -> Result<Vec<f32>, ComputeError>;
}

/// 🔧 Knobs for [`SimulatedCompute`].
#[derive(Debug, Deserialize, Clone)]
pub struct ComputeConfig {
    #[serde(default = "default_preprocess_delay_ms")]
    pub preprocess_delay_ms: u64,
    #[serde(default = "default_compute_delay_ms")]
    pub compute_delay_ms: u64,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

// -- 🧽 "cleaning the text", allegedly
fn default_preprocess_delay_ms() -> u64 {
    500
}

// -- 🧠 "calling the model", allegedly
fn default_compute_delay_ms() -> u64 {
    1000
}

fn default_dimensions() -> usize {
    3
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            preprocess_delay_ms: default_preprocess_delay_ms(),
            compute_delay_ms: default_compute_delay_ms(),
            dimensions: default_dimensions(),
        }
    }
}

/// 🎭 A stand-in embedder: sleeps like it's thinking, then returns a vector
/// that depends only on the payload. Same text in, same numbers out.
#[derive(Debug, Clone)]
pub struct SimulatedCompute {
    preprocess_delay: Duration,
    compute_delay: Duration,
    dimensions: usize,
}

impl SimulatedCompute {
    pub fn new(preprocess_delay: Duration, compute_delay: Duration, dimensions: usize) -> Self {
        Self {
            preprocess_delay,
            compute_delay,
            dimensions,
        }
    }

    /// ⚡ No sleeping on the job. For tests and impatient people.
    pub fn instant(dimensions: usize) -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, dimensions)
    }

    pub fn from_config(config: &ComputeConfig) -> Self {
        Self::new(
            Duration::from_millis(config.preprocess_delay_ms),
            Duration::from_millis(config.compute_delay_ms),
            config.dimensions,
        )
    }

    /// 🔢 The "embedding": a payload fingerprint plus a tenth per dimension.
    fn fake_vector(&self, payload: &str) -> Vec<f32> {
        let fingerprint = payload
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
            % 1000;
        (0..self.dimensions)
            .map(|j| fingerprint as f32 + j as f32 * 0.1)
            .collect()
    }
}

#[async_trait]
impl Compute for SimulatedCompute {
    async fn compute(&self, payload: &str) -> Result<Vec<f32>, ComputeError> {
        if payload.trim().is_empty() {
            return Err(ComputeError::EmptyPayload);
        }
        if !self.preprocess_delay.is_zero() {
            tokio::time::sleep(self.preprocess_delay).await;
        }
        trace!(payload_len = payload.len(), "🧮 simulating embedding calculation");
        if !self.compute_delay.is_zero() {
            tokio::time::sleep(self.compute_delay).await;
        }
        Ok(self.fake_vector(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_the_same_text_gets_the_same_numbers() {
        let compute = SimulatedCompute::instant(4);
        let first = compute.compute("coi rodo").await.unwrap();
        let second = compute.compute("coi rodo").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert!((first[1] - first[0] - 0.1).abs() < 1e-4);
    }

    #[tokio::test]
    async fn the_one_where_blank_text_is_an_item_level_failure() {
        let compute = SimulatedCompute::instant(3);
        assert_eq!(compute.compute("   ").await, Err(ComputeError::EmptyPayload));
    }

    #[test]
    fn the_one_where_defaults_match_the_old_factory_floor() {
        let config = ComputeConfig::default();
        assert_eq!(config.preprocess_delay_ms, 500);
        assert_eq!(config.compute_delay_ms, 1000);
        assert_eq!(config.dimensions, 3);
    }
}
