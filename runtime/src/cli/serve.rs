// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run the service: scrape loop plus read API, until Ctrl-C.

use anyhow::Result;
use ratekeeper::config::Config;
use ratekeeper::query::QueryService;
use ratekeeper::rest::{self, AppState};
use ratekeeper::scheduler::ScrapeHealth;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

pub async fn run(config: Config) -> Result<()> {
    info!("starting ratekeeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        target_url = %config.target_url,
        db = %config.db_path.display(),
        retained = config.retained_records,
        "configuration loaded"
    );

    let store = super::open_store(&config)?;
    let health = Arc::new(ScrapeHealth::new(config.failure_alert_threshold));
    let scheduler = super::build_scheduler(&config, Arc::clone(&store), Arc::clone(&health));

    let shutdown = Arc::new(Notify::new());
    let scrape_loop = scheduler.spawn(config.scrape_interval, Arc::clone(&shutdown));

    // Set up SIGINT handling
    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        shutdown_signal.notify_waiters();
    });

    let state = Arc::new(AppState {
        query: QueryService::new(Arc::clone(&store), config.fallback_rate),
        store,
        health,
    });
    let result = rest::start(config.listen_addr(), state, shutdown).await;

    if result.is_err() {
        scrape_loop.abort();
    }
    let _ = scrape_loop.await;

    info!("ratekeeper stopped");
    result
}
