//! RET CLI: watch a thermostat's live-update feed.

mod monitor;

use anyhow::{Context, Result};
use clap::Parser;
use monitor::FeedMonitor;
use ret_config::{CliOverrides, RetConfig};
use ret_sse::EventSource;
use std::io::{self, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ret", version, about = "Watch a thermostat's live-update feed")]
struct Cli {
    /// Feed URL (overrides RET_FEED_URL)
    #[arg(long)]
    url: Option<String>,

    /// Bearer token for the feed (overrides RET_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,

    /// Print each event as a JSON object on its own line
    #[arg(long)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

/// Default log filter when `RUST_LOG` is unset.
fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn,ret=info,ret_sse=info,ret_config=info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter(cli.verbose))),
        )
        .with_writer(io::stderr)
        .init();

    let config = RetConfig::load(CliOverrides {
        url: cli.url,
        auth_token: cli.auth_token,
    })
    .context("Failed to load configuration")?;
    tracing::debug!(
        "Loaded configuration from {}",
        config.config_file().display()
    );

    let source = EventSource::new(&config.feed_url, config.auth_token.clone())
        .context("Failed to create event source")?
        .with_reconnect_config(config.reconnect.clone())
        .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms));

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nShutting down...");
            on_ctrl_c.cancel();
        }
    });

    eprintln!(
        "ret v{} watching {}. Press Ctrl+C to exit.",
        env!("CARGO_PKG_VERSION"),
        source.url()
    );

    let mut monitor = FeedMonitor::new(cli.json);
    let stdout = io::stdout();
    source
        .run(cancel, |event| {
            if let Some(line) = monitor.handle(event) {
                let mut out = stdout.lock();
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
        })
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_shows_ret_info() {
        let filter = log_filter(false);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("ret_sse=info"));
        assert!(tracing_subscriber::EnvFilter::try_new(filter).is_ok());
    }

    #[test]
    fn verbose_filter_is_debug() {
        assert_eq!(log_filter(true), "debug");
    }
}
