// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page scraping.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The fetcher
//! is the only consumer.

pub mod chromium;

use crate::error::FetchFailure;
use async_trait::async_trait;
use serde::Serialize;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new browser session presenting the given user agent.
    async fn new_context(&self, user_agent: &str) -> Result<Box<dyn RenderContext>, FetchFailure>;
    /// Number of currently open sessions.
    fn active_contexts(&self) -> usize;
}

/// A single browser session holding one page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL, giving up after `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64)
        -> Result<NavigationResult, FetchFailure>;
    /// Wait up to `timeout_ms` for `selector` to match, then return its
    /// text content. `Ok(None)` means the element exists but has no text.
    async fn wait_for_text(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Option<String>, FetchFailure>;
    /// Close this session and release the browser.
    async fn close(self: Box<Self>) -> Result<(), FetchFailure>;
}

/// A renderer used when Chromium is unavailable. Every fetch fails, but the
/// read API keeps serving stored or fallback data.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self, _user_agent: &str) -> Result<Box<dyn RenderContext>, FetchFailure> {
        Err(FetchFailure::Browser("browser not available".to_string()))
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
