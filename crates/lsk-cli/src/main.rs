//! 🚀 lsk-cli: the front door, the bouncer, the maitre d' of lsk.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, runs the embedding pipeline until Ctrl-C (or a deadline),
//! and prints what happened. Like a manager. 🦆

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 📚 Runs the definition embedding pipeline.
#[derive(Debug, Parser)]
#[command(name = "lsk-cli", version)]
struct Cli {
    /// 🔧 TOML config file. Defaults to `lsk.toml` if it exists, otherwise env vars only (LSK_*).
    config: Option<PathBuf>,

    /// ⏱️ Stop on our own after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

/// 🔒 An explicit path must exist; the default path is optional.
fn resolve_config_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!(
                    "💀 Couldn't check whether the config file exists. It may be an issue with \
                     pwd/cwd and relative paths; an absolute path removes all doubt. \
                     Was checking here: '{}'",
                    path.display()
                )
            })?;
            anyhow::ensure!(
                exists,
                "💀 Config file '{}' does not exist. Double check the path.",
                path.display()
            );
            Ok(Some(path))
        }
        None => {
            let default = PathBuf::from("lsk.toml");
            Ok(default.try_exists().unwrap_or(false).then_some(default))
        }
    }
}

/// 🛑 Cancel the token on Ctrl-C, or after the deadline if one was given.
fn spawn_stop_trigger(stop: CancellationToken, run_for: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match run_for {
                Some(run_for) => tokio::time::sleep(run_for).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => info!("🛑 Ctrl-C received, shutting down"),
                Err(err) => error!(error = %err, "💀 couldn't listen for Ctrl-C, shutting down"),
            },
            _ = deadline => info!("⏱️ run time is up, shutting down"),
        }
        stop.cancel();
    });
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(cli.config)?;
    let app_config = lsk::app_config::load_config(config_path.as_deref()).context(
        "💀 In lsk-cli, main, we couldn't load the config. Take a look at the file and the LSK_* \
         environment, make sure you didn't forget something obvious",
    )?;

    let stop = CancellationToken::new();
    spawn_stop_trigger(stop.clone(), cli.run_for_secs.map(Duration::from_secs));

    let report = lsk::run(app_config, stop).await?;
    println!("{}", report.to_table());
    Ok(())
}

/// 🚀 main(): where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() {
    // 📡 Set up tracing, because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_args_parse_the_way_the_help_text_says() {
        let cli = Cli::try_parse_from(["lsk-cli", "custom.toml", "--run-for-secs", "5"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.run_for_secs, Some(5));

        let bare = Cli::try_parse_from(["lsk-cli"]).unwrap();
        assert!(bare.config.is_none());
        assert!(bare.run_for_secs.is_none());
    }

    #[test]
    fn the_one_where_a_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = resolve_config_path(Some(missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
