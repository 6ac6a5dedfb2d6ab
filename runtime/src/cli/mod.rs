// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the ratekeeper binary.

pub mod latest_cmd;
pub mod once_cmd;
pub mod serve;

use anyhow::{Context, Result};
use ratekeeper::config::Config;
use ratekeeper::fetcher::Fetcher;
use ratekeeper::renderer::chromium::ChromiumRenderer;
use ratekeeper::renderer::{NoopRenderer, Renderer};
use ratekeeper::scheduler::{ScrapeHealth, Scheduler};
use ratekeeper::store::RateStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Open the rate store and trim it to the configured window.
pub fn open_store(config: &Config) -> Result<Arc<RateStore>> {
    let store = RateStore::open(&config.db_path, config.retained_records)
        .with_context(|| format!("failed to open rate store at {}", config.db_path.display()))?;

    let evicted = store
        .evict_oldest()
        .context("failed to apply retention window")?;
    if evicted > 0 {
        info!(evicted, "trimmed stored history to retention window");
    }
    Ok(Arc::new(store))
}

/// Chromium when available, otherwise a renderer that fails every fetch so
/// the API can still serve stored or fallback data.
pub fn build_renderer(config: &Config) -> Arc<dyn Renderer> {
    match ChromiumRenderer::new(config.chromium_path.as_ref()) {
        Ok(renderer) => {
            info!("Chromium renderer initialized");
            Arc::new(renderer)
        }
        Err(e) => {
            warn!("Failed to initialize Chromium: {e}");
            warn!("Scrapes will fail until a browser is installed");
            Arc::new(NoopRenderer)
        }
    }
}

/// Wire fetcher, store and health into a scheduler.
pub fn build_scheduler(
    config: &Config,
    store: Arc<RateStore>,
    health: Arc<ScrapeHealth>,
) -> Arc<Scheduler> {
    let fetcher = Fetcher::new(build_renderer(config), config.fetch_timeouts());
    Arc::new(Scheduler::new(
        fetcher,
        store,
        config.scrape_target(),
        health,
    ))
}
