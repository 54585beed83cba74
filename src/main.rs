mod config;
mod graph;
mod lookup;
mod server;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::lookup::LookupTable;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,linkbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Reply mode: {}", config.bot.reply_mode);
    info!("  Default URL: {}", config.bot.default_url);
    info!("  Sheet: {} ({})", config.sheet.spreadsheet_id, config.sheet.range);

    // Load the lookup table once; a failure here is fatal.
    let table = LookupTable::load(&config.sheet, config.bot.default_url.clone())
        .await
        .context("Failed to load the lookup sheet")?;

    // Create shared state
    let state = Arc::new(AppState::new(config, table));

    // Run the webhook server
    info!("Bot is starting...");
    server::run(state).await?;

    Ok(())
}
