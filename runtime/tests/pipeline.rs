// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scrape pipeline: fetch → parse → store → query → HTTP.

use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ratekeeper::error::FetchFailure;
use ratekeeper::fetcher::{FetchTimeouts, Fetcher};
use ratekeeper::query::QueryService;
use ratekeeper::renderer::{NavigationResult, RenderContext, Renderer};
use ratekeeper::rest::{self, AppState};
use ratekeeper::scheduler::{RunOutcome, ScrapeHealth, ScrapeTarget, Scheduler};
use ratekeeper::store::RateStore;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Serves page texts in order; `None` simulates a navigation timeout.
struct PageSequence {
    pages: Mutex<VecDeque<Option<&'static str>>>,
}

impl PageSequence {
    fn new(pages: impl IntoIterator<Item = Option<&'static str>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
        })
    }
}

#[async_trait]
impl Renderer for PageSequence {
    async fn new_context(&self, _user_agent: &str) -> Result<Box<dyn RenderContext>, FetchFailure> {
        let page = self.pages.lock().unwrap().pop_front().flatten();
        Ok(Box::new(Page { text: page }))
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

struct Page {
    text: Option<&'static str>,
}

#[async_trait]
impl RenderContext for Page {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult, FetchFailure> {
        match self.text {
            Some(_) => Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 5,
            }),
            None => Err(FetchFailure::NavigationTimeout { timeout_ms }),
        }
    }

    async fn wait_for_text(
        &self,
        _selector: &str,
        _timeout_ms: u64,
    ) -> Result<Option<String>, FetchFailure> {
        Ok(self.text.map(str::to_string))
    }

    async fn close(self: Box<Self>) -> Result<(), FetchFailure> {
        Ok(())
    }
}

struct Harness {
    scheduler: Scheduler,
    store: Arc<RateStore>,
    state: Arc<AppState>,
}

fn harness(pages: Arc<PageSequence>, store: RateStore) -> Harness {
    let store = Arc::new(store);
    let health = Arc::new(ScrapeHealth::new(3));
    let scheduler = Scheduler::new(
        Fetcher::new(pages, FetchTimeouts::default()),
        Arc::clone(&store),
        ScrapeTarget {
            url: "https://rates.example/exchange/USDT_RUB".to_string(),
            selector: "span.me-2".to_string(),
            source: "Rapira".to_string(),
        },
        Arc::clone(&health),
    );
    let state = Arc::new(AppState {
        query: QueryService::new(Arc::clone(&store), 92.5),
        store: Arc::clone(&store),
        health,
    });
    Harness {
        scheduler,
        store,
        state,
    }
}

async fn get_rate(state: Arc<AppState>) -> (StatusCode, Value) {
    let response = rest::router(state)
        .oneshot(Request::builder().uri("/api/rate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_api_degrades_until_first_capture() {
    let h = harness(
        PageSequence::new([None, Some("95,10")]),
        RateStore::open_in_memory(5).unwrap(),
    );

    assert!(matches!(h.scheduler.run_once().await, RunOutcome::Failed(_)));
    let (status, body) = get_rate(Arc::clone(&h.state)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_include!(
        actual: body,
        expected: json!({ "success": false, "rate": 92.5, "source": "Fallback" })
    );

    assert!(matches!(h.scheduler.run_once().await, RunOutcome::Stored(_)));
    let (status, body) = get_rate(Arc::clone(&h.state)).await;
    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body,
        expected: json!({ "success": true, "rate": 95.1, "source": "Rapira" })
    );
}

#[tokio::test]
async fn test_failures_keep_serving_last_good_rate() {
    let h = harness(
        PageSequence::new([Some("90,5"), Some("—"), None, Some("")]),
        RateStore::open_in_memory(5).unwrap(),
    );

    assert!(matches!(h.scheduler.run_once().await, RunOutcome::Stored(_)));
    for _ in 0..3 {
        assert!(matches!(h.scheduler.run_once().await, RunOutcome::Failed(_)));
    }

    assert_eq!(h.store.len().unwrap(), 1);
    let (status, body) = get_rate(Arc::clone(&h.state)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rate"], json!(90.5));
    assert!(h.state.health.is_stale());
}

#[tokio::test]
async fn test_history_bounded_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rates.db");
    let texts = ["10", "20", "30", "40", "50", "60"];

    {
        let h = harness(
            PageSequence::new(texts.iter().copied().map(Some)),
            RateStore::open(&path, 5).unwrap(),
        );
        for _ in texts {
            h.scheduler.run_once().await;
        }
    }

    let store = RateStore::open(&path, 5).unwrap();
    let rates: Vec<f64> = store.recent().unwrap().iter().map(|r| r.rate).collect();
    assert_eq!(rates, vec![60.0, 50.0, 40.0, 30.0, 20.0]);

    let query = QueryService::new(Arc::new(store), 92.5);
    let current = query.current_rate();
    assert_eq!(current.rate, 60.0);
    assert!(!current.degraded);
}
