// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Perform a single scrape run and report what happened.

use anyhow::{anyhow, Result};
use ratekeeper::config::Config;
use ratekeeper::scheduler::{RunOutcome, ScrapeHealth};
use std::sync::Arc;

pub async fn run(config: Config, json: bool) -> Result<()> {
    let store = super::open_store(&config)?;
    let health = Arc::new(ScrapeHealth::new(config.failure_alert_threshold));
    let scheduler = super::build_scheduler(&config, Arc::clone(&store), health);

    match scheduler.run_once().await {
        RunOutcome::Stored(record) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!(
                    "  Stored rate {} from {} (id {})",
                    record.rate, record.source, record.id
                );
            }
            Ok(())
        }
        RunOutcome::Failed(e) => Err(anyhow!("scrape failed during {}: {e}", e.stage())),
        RunOutcome::Skipped => Err(anyhow!("another scrape run is in progress")),
    }
}
