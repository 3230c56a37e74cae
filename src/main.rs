//! # Stockwatch — Scheduled Stock Price Watcher
//!
//! One invocation = one tick, started by an external scheduler (cron, CI).
//!
//! ## Flow
//! ```text
//!  ┌──────────────┐  getUpdates   ┌──────────────────┐
//!  │  Telegram    │ ─────────────▶│  Command phase   │──▶ holdings.json
//!  │  (owner)     │ ◀─────────────│  buy/watch/sell  │
//!  └──────────────┘    replies    └──────────────────┘
//!         ▲
//!         │ sendMessage           ┌──────────────────┐
//!         └───────────────────────│   Scan phase     │◀── Yahoo Finance quotes
//!                                 │ evaluate+cooldown│◀─▶ state.json
//!                                 └──────────────────┘
//! ```
//!
//! `RUN_MODE` selects the phases (`all`, `commands`, `scan`). See
//! [`config::Config`] for every environment variable.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod bot;
mod commands;
mod config;
mod engine;
mod error;
mod models;
mod quotes;
mod registry;
mod state;
mod storage;
mod telegram;

use config::Config;
use quotes::YahooQuoteProvider;
use telegram::TelegramClient;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional — CI/prod can use real env vars) ──────────────
    dotenvy::dotenv().ok();

    // ── 2. Initialise structured logging ─────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("stockwatch=info".parse()?)
            .add_directive("reqwest=warn".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        STOCKWATCH — Price Alert Watcher       ║
  ║        Yahoo quotes  ·  Telegram alerts       ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Configuration (fatal on error) ────────────────────────────────────
    let config = Config::from_env().context("Failed to load config")?;

    info!(
        mode     = %config.run_mode,
        holdings = %config.holdings_path.display(),
        state    = %config.state_path.display(),
        tz       = %config.display_tz,
        "Stockwatch started"
    );

    // ── 4. Clients ───────────────────────────────────────────────────────────
    let telegram = TelegramClient::new(&config.telegram_api_base, &config.telegram_token, config.fetch_timeout)
        .context("Failed to build Telegram client")?;

    // ── 5. Command phase ─────────────────────────────────────────────────────
    if config.run_mode.runs_commands() {
        // A Telegram outage must not cost the price scan.
        if let Err(e) = bot::run_commands(&config, &telegram).await {
            error!(error = %e, "❌ Command phase failed — continuing");
        }
    }

    // ── 6. Scan phase ────────────────────────────────────────────────────────
    if config.run_mode.runs_scan() {
        let provider = YahooQuoteProvider::new(&config.quote_base_url, config.fetch_timeout)
            .context("Failed to build quote client")?;

        let report = engine::scan::run_scan(&config, &provider, &telegram)
            .await
            .context("Scan failed")?;

        info!(fired = report.fired, delivered = report.delivered, "✅ Run finished");
    }

    Ok(())
}
