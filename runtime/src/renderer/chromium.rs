// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Each context owns a whole headless browser process. The process is shut
//! down by `close()`, and killed when the context is dropped without one.

use super::{NavigationResult, RenderContext, Renderer};
use crate::error::FetchFailure;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Poll step while waiting for a selector to appear.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Find the Chromium binary path.
///
/// An explicitly configured path wins when it exists; otherwise the usual
/// install locations are probed.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // 2. RATEKEEPER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("RATEKEEPER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.ratekeeper/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".ratekeeper/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".ratekeeper/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".ratekeeper/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".ratekeeper/chromium/chrome-linux64/chrome"),
                home.join(".ratekeeper/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS / Windows locations
    let common = if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    } else if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe")
    } else {
        PathBuf::from("/usr/bin/google-chrome")
    };
    if common.exists() {
        return Some(common);
    }

    None
}

/// Chromium-based renderer. Launches one browser per context.
pub struct ChromiumRenderer {
    chrome_path: PathBuf,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Create a renderer after locating a Chromium binary. No browser is
    /// started until a context is requested.
    pub fn new(configured: Option<&PathBuf>) -> anyhow::Result<Self> {
        let chrome_path = find_chromium(configured).ok_or_else(|| {
            anyhow::anyhow!(
                "Chromium not found. Install google-chrome or set RATEKEEPER_CHROMIUM_PATH."
            )
        })?;
        debug!("using Chromium at {}", chrome_path.display());

        Ok(Self {
            chrome_path,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchFailure> {
        BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| FetchFailure::Browser(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, user_agent: &str) -> Result<Box<dyn RenderContext>, FetchFailure> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| FetchFailure::Browser(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match open_page(&browser, user_agent).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(e);
            }
        };

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            browser,
            page,
            handler_task,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

async fn open_page(browser: &Browser, user_agent: &str) -> Result<Page, FetchFailure> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| FetchFailure::Browser(format!("failed to create new page: {e}")))?;

    page.set_user_agent(SetUserAgentOverrideParams::new(user_agent))
        .await
        .map_err(|e| FetchFailure::Browser(format!("failed to set user agent: {e}")))?;

    Ok(page)
}

/// A single Chromium browser session.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<NavigationResult, FetchFailure> {
        let start = Instant::now();
        let budget = Duration::from_millis(timeout_ms);

        let result = tokio::time::timeout(budget, async {
            self.page.goto(url).await?;
            // Wait for page to be loaded
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(FetchFailure::Navigation(e.to_string())),
            Err(_) => Err(FetchFailure::NavigationTimeout { timeout_ms }),
        }
    }

    async fn wait_for_text(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Option<String>, FetchFailure> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let found = tokio::time::timeout(remaining, self.page.find_element(selector)).await;

            if let Ok(Ok(element)) = found {
                let text = element
                    .inner_text()
                    .await
                    .map_err(|e| FetchFailure::Browser(format!("failed to read text: {e}")))?;
                return Ok(text);
            }

            if Instant::now() + SELECTOR_POLL_INTERVAL >= deadline {
                return Err(FetchFailure::SelectorNotFound {
                    selector: selector.to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn close(mut self: Box<Self>) -> Result<(), FetchFailure> {
        let _ = self.page.clone().close().await;
        let closed = self
            .browser
            .close()
            .await
            .map_err(|e| FetchFailure::Browser(format!("failed to close browser: {e}")));
        if closed.is_ok() {
            let _ = self.browser.wait().await;
        }
        closed.map(|_| ())
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.handler_task.abort();
        // `browser` kills its child process when dropped if still running.
    }
}
