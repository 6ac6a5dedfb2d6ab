// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Print the rate the API would currently serve.

use anyhow::Result;
use ratekeeper::config::Config;
use ratekeeper::query::QueryService;

pub async fn run(config: Config, json: bool) -> Result<()> {
    let store = super::open_store(&config)?;
    let current = QueryService::new(store, config.fallback_rate).current_rate();

    if json {
        println!("{}", serde_json::to_string_pretty(&current)?);
        return Ok(());
    }

    match current.captured_at {
        Some(ts) => println!(
            "  {} ({}, captured {})",
            current.rate,
            current.source,
            ts.to_rfc3339()
        ),
        None => println!("  {} (fallback, no rate captured yet)", current.rate),
    }
    Ok(())
}
