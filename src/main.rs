use anyhow::{Context, Result};
use clap::Parser;
use message_sync::app_log;
use message_sync::cli::{handle_sync_command, SyncCli};
use std::fs::OpenOptions;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to a file so the terminal stays readable while watching
    let log_path =
        std::env::var("PORTAL_SYNC_LOG").unwrap_or_else(|_| "/tmp/portal-sync.log".to_string());
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true) // Clear file on startup
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    app_log!(info, "portal-sync {}", env!("CARGO_PKG_VERSION"));

    handle_sync_command(SyncCli::parse()).await
}
