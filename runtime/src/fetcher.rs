// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fetcher adapter — pulls the raw rate text off the target page.
//!
//! This is the only component that performs browser or network I/O. It
//! knows nothing about parsing or persistence.

use crate::error::FetchFailure;
use crate::renderer::{RenderContext, Renderer};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// User agents rotated across fetches to reduce blocking by the origin.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Independent time budgets for the two blocking phases of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    pub navigation: Duration,
    pub selector: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_millis(61_000),
            selector: Duration::from_millis(10_000),
        }
    }
}

/// Extracts a single text value from a page through a [`Renderer`].
pub struct Fetcher {
    renderer: Arc<dyn Renderer>,
    timeouts: FetchTimeouts,
    user_agents: Vec<String>,
}

impl Fetcher {
    pub fn new(renderer: Arc<dyn Renderer>, timeouts: FetchTimeouts) -> Self {
        Self {
            renderer,
            timeouts,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }

    /// Replace the user-agent rotation set. An empty set keeps the defaults.
    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        if !user_agents.is_empty() {
            self.user_agents = user_agents;
        }
        self
    }

    /// Pick a user agent uniformly at random.
    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    /// Navigate to `url` and return the trimmed text of `selector`.
    ///
    /// The browser session is closed on every path out of this function.
    #[instrument(name = "fetch", skip_all, fields(url = %url, selector = %selector))]
    pub async fn fetch(&self, url: &str, selector: &str) -> Result<String, FetchFailure> {
        let user_agent = self.pick_user_agent().to_string();
        debug!(user_agent = %user_agent, "opening browser session");

        let mut ctx = self.renderer.new_context(&user_agent).await?;
        let result = self.extract(ctx.as_mut(), url, selector).await;

        if let Err(e) = ctx.close().await {
            warn!("failed to close browser session: {e}");
        }

        result
    }

    async fn extract(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        selector: &str,
    ) -> Result<String, FetchFailure> {
        let nav = ctx
            .navigate(url, self.timeouts.navigation.as_millis() as u64)
            .await?;
        debug!(final_url = %nav.final_url, load_time_ms = nav.load_time_ms, "page loaded");

        let text = ctx
            .wait_for_text(selector, self.timeouts.selector.as_millis() as u64)
            .await?;

        match text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t.to_string()),
            _ => Err(FetchFailure::NoTextContent {
                selector: selector.to_string(),
            }),
        }
    }
}
