//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." said every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Every section is optional. An empty file (or no file at all) gives you the
//! factory defaults: a 15 s tick, 3 workers, queues of 10, an in-memory store.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::StoreConfig;
use crate::broadcaster::BroadcasterConfig;
use crate::compute::ComputeConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub compute: ComputeConfig,
    pub broadcaster: BroadcasterConfig,
    /// 🗄️ `[store.InMemory]` or `[store.File]`
    pub store: StoreConfig,
}

/// 🧵 How hard the supervisor drives its minions.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// ⏱️ time between fetcher ticks; the first tick waits one full interval
    #[serde(default = "default_tick_interval_ms", alias = "interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_worker_count", alias = "num_workers")]
    pub worker_count: usize,
    /// 📥 fetcher → workers
    #[serde(default = "default_queue_capacity")]
    pub input_capacity: usize,
    /// 📤 workers → updater
    #[serde(default = "default_queue_capacity")]
    pub output_capacity: usize,
    /// 🔍 how many pending items one tick asks the store for
    #[serde(default = "default_discover_limit")]
    pub discover_limit: usize,
    /// ⏳ a computation running longer than this becomes a `Timeout` result
    #[serde(default = "default_compute_timeout_ms")]
    pub compute_timeout_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    15_000
}

fn default_worker_count() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    10
}

fn default_discover_limit() -> usize {
    10
}

fn default_compute_timeout_ms() -> u64 {
    30_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            worker_count: default_worker_count(),
            input_capacity: default_queue_capacity(),
            output_capacity: default_queue_capacity(),
            discover_limit: default_discover_limit(),
            compute_timeout_ms: default_compute_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.tick_interval_ms == 0 {
            problems.push("pipeline.tick_interval_ms must be greater than zero".to_string());
        }
        if self.worker_count == 0 {
            problems.push("pipeline.worker_count must be at least 1".to_string());
        }
        if self.input_capacity == 0 {
            problems.push("pipeline.input_capacity must be at least 1".to_string());
        }
        if self.output_capacity == 0 {
            problems.push("pipeline.output_capacity must be at least 1".to_string());
        }
        if self.discover_limit == 0 {
            problems.push("pipeline.discover_limit must be at least 1".to_string());
        }
        if self.compute_timeout_ms == 0 {
            problems.push("pipeline.compute_timeout_ms must be greater than zero".to_string());
        }
        problems
    }
}

impl AppConfig {
    /// ✅ Reports every problem at once, so nobody plays whack-a-mole with their TOML.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut problems = self.pipeline.problems();
        if self.compute.dimensions == 0 {
            problems.push("compute.dimensions must be at least 1".to_string());
        }
        if self.broadcaster.event_buffer == 0 {
            problems.push("broadcaster.event_buffer must be at least 1".to_string());
        }
        if !problems.is_empty() {
            bail!(
                "💀 The configuration has {} problem(s):\n  - {}",
                problems.len(),
                problems.join("\n  - ")
            );
        }
        Ok(())
    }
}

/// 🚀 Load the config from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`LSK_*`, nested with `__`, e.g.
/// `LSK_PIPELINE__WORKER_COUNT=8`) with an optional TOML file. TOML wins on conflicts.
///   - `None` → env vars only. No file. No assumptions. No pizza defaults.
///   - `Some` → env vars + TOML file, merged.
///
/// 💀 Returns an error if the config is unparseable or fails validation.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LSK_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LSK_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LSK_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_test_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("lsk.toml");
        // 🧪 We write a real file here because Figment wants TOML from disk, like it's method acting.
        fs::write(&path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        path
    }

    #[test]
    fn the_one_where_an_empty_file_means_factory_defaults() {
        let dir = tempfile::tempdir().expect("💀 no tempdir, no party");
        let path = write_test_config(&dir, "");

        let app_config = load_config(Some(path.as_path())).expect("💀 empty config should parse");

        assert_eq!(app_config.pipeline.tick_interval(), Duration::from_secs(15));
        assert_eq!(app_config.pipeline.worker_count, 3);
        assert_eq!(app_config.pipeline.input_capacity, 10);
        assert_eq!(app_config.pipeline.output_capacity, 10);
        assert_eq!(app_config.pipeline.discover_limit, 10);
        assert_eq!(app_config.pipeline.compute_timeout(), Duration::from_secs(30));
        assert_eq!(app_config.broadcaster.event_buffer, 32);
        assert!(matches!(app_config.store, StoreConfig::InMemory(_)));
    }

    #[test]
    fn the_one_where_every_section_gets_its_say() {
        let dir = tempfile::tempdir().expect("💀 no tempdir, no party");
        let path = write_test_config(
            &dir,
            r#"
            [pipeline]
            tick_interval_ms = 250
            num_workers = 5
            input_capacity = 4

            [compute]
            compute_delay_ms = 0
            dimensions = 8

            [broadcaster]
            event_buffer = 64

            [store.File]
            input_file = "definitions.ndjson"
            output_file = "embeddings.ndjson"
            "#,
        );

        let app_config = load_config(Some(path.as_path())).expect("💀 full config should parse");

        assert_eq!(app_config.pipeline.tick_interval_ms, 250);
        assert_eq!(app_config.pipeline.worker_count, 5, "the alias still answers");
        assert_eq!(app_config.pipeline.input_capacity, 4);
        assert_eq!(app_config.pipeline.output_capacity, 10);
        assert_eq!(app_config.compute.compute_delay_ms, 0);
        assert_eq!(app_config.compute.preprocess_delay_ms, 500);
        assert_eq!(app_config.compute.dimensions, 8);
        assert_eq!(app_config.broadcaster.event_buffer, 64);
        match app_config.store {
            StoreConfig::File(file_config) => {
                assert_eq!(file_config.input_file, "definitions.ndjson");
                assert_eq!(file_config.output_file, "embeddings.ndjson");
            }
            honestly_who_knows => panic!(
                "💀 Expected a File store, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_in_memory_definitions_come_from_toml() {
        let dir = tempfile::tempdir().expect("💀 no tempdir, no party");
        let seeded = toml::toml! {
            [store.InMemory]
            definitions = [
                { id = 1, payload = "coi" },
                { id = 2, payload = "co'o" },
            ]
        };
        let path = write_test_config(&dir, &seeded.to_string());

        let app_config = load_config(Some(path.as_path())).expect("💀 seeded config should parse");
        match app_config.store {
            StoreConfig::InMemory(mem) => assert_eq!(mem.definitions.len(), 2),
            other => panic!("💀 Expected InMemory, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_every_problem_is_reported_at_once() {
        let dir = tempfile::tempdir().expect("💀 no tempdir, no party");
        let path = write_test_config(
            &dir,
            r#"
            [pipeline]
            worker_count = 0
            output_capacity = 0
            discover_limit = 0

            [broadcaster]
            event_buffer = 0
            "#,
        );

        let err = load_config(Some(path.as_path())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("4 problem(s)"), "got: {message}");
        assert!(message.contains("pipeline.worker_count"));
        assert!(message.contains("pipeline.output_capacity"));
        assert!(message.contains("pipeline.discover_limit"));
        assert!(message.contains("broadcaster.event_buffer"));
    }
}
