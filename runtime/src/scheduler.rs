// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scrape scheduler — runs Fetch → Parse → Store on a fixed interval.
//!
//! A run fires once at startup and then on every tick. Runs never overlap:
//! a tick that finds the previous run still in progress is skipped, not
//! queued. Every failure is contained in its run; the next tick is the only
//! retry.

use crate::error::ScrapeError;
use crate::fetcher::Fetcher;
use crate::parser::parse_rate;
use crate::store::{RateRecord, RateStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Where to scrape and how to label what is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub url: String,
    pub selector: String,
    pub source: String,
}

/// Result of one trigger.
#[derive(Debug)]
pub enum RunOutcome {
    /// A record was committed.
    Stored(RateRecord),
    /// The run aborted; nothing was written.
    Failed(ScrapeError),
    /// A previous run was still in progress.
    Skipped,
}

/// Point-in-time view of scrape health.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_runs: u64,
    pub total_failures: u64,
    pub skipped_ticks: u64,
}

/// Shared scrape bookkeeping, read by the health endpoint.
pub struct ScrapeHealth {
    state: Mutex<HealthSnapshot>,
    alert_threshold: u32,
}

impl ScrapeHealth {
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            state: Mutex::new(HealthSnapshot::default()),
            alert_threshold: alert_threshold.max(1),
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.lock().clone()
    }

    pub fn alert_threshold(&self) -> u32 {
        self.alert_threshold
    }

    /// True once consecutive failures reach the alert threshold.
    pub fn is_stale(&self) -> bool {
        self.lock().consecutive_failures >= self.alert_threshold
    }

    pub(crate) fn record_attempt(&self) {
        let mut state = self.lock();
        state.last_attempt = Some(Utc::now());
        state.total_runs += 1;
    }

    pub(crate) fn record_success(&self) {
        let mut state = self.lock();
        state.last_success = Some(Utc::now());
        state.last_error = None;
        state.consecutive_failures = 0;
    }

    /// Returns the new consecutive failure count.
    pub(crate) fn record_failure(&self, err: &ScrapeError) -> u32 {
        let mut state = self.lock();
        state.last_error = Some(err.to_string());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_failures += 1;
        state.consecutive_failures
    }

    pub(crate) fn record_skip(&self) {
        self.lock().skipped_ticks += 1;
    }

    fn lock(&self) -> MutexGuard<'_, HealthSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the running flag however the run ends, including abort.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the scrape pipeline.
pub struct Scheduler {
    fetcher: Fetcher,
    store: Arc<RateStore>,
    target: ScrapeTarget,
    health: Arc<ScrapeHealth>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        fetcher: Fetcher,
        store: Arc<RateStore>,
        target: ScrapeTarget,
        health: Arc<ScrapeHealth>,
    ) -> Self {
        Self {
            fetcher,
            store,
            target,
            health,
            running: AtomicBool::new(false),
        }
    }

    pub fn health(&self) -> Arc<ScrapeHealth> {
        Arc::clone(&self.health)
    }

    /// Whether a run is currently in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute one scrape run unless another is in progress.
    pub async fn run_once(&self) -> RunOutcome {
        let Some(_guard) = self.try_begin() else {
            self.health.record_skip();
            debug!("previous scrape still running, skipping tick");
            return RunOutcome::Skipped;
        };

        self.health.record_attempt();
        let started = Instant::now();

        match self.pipeline().await {
            Ok(record) => {
                self.health.record_success();
                info!(
                    id = record.id,
                    rate = record.rate,
                    source = %record.source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "rate stored"
                );
                RunOutcome::Stored(record)
            }
            Err(e) => {
                let failures = self.health.record_failure(&e);
                warn!(
                    stage = e.stage(),
                    consecutive_failures = failures,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scrape run failed: {e}"
                );
                let threshold = self.health.alert_threshold();
                if failures >= threshold && failures % threshold == 0 {
                    error!(
                        consecutive_failures = failures,
                        "rate source unreachable; API is serving stale or fallback data"
                    );
                }
                RunOutcome::Failed(e)
            }
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    async fn pipeline(&self) -> Result<RateRecord, ScrapeError> {
        let raw = self
            .fetcher
            .fetch(&self.target.url, &self.target.selector)
            .await?;
        let rate = parse_rate(&raw)?;
        Ok(self.store.insert(rate, &self.target.source)?)
    }

    /// Spawn the timer loop: one run immediately, then one per `interval`,
    /// until `shutdown` is notified. An in-flight run is abandoned on
    /// shutdown; the store never exposes a partial write.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "scrape loop started: url={} interval={}ms",
                self.target.url,
                interval.as_millis()
            );

            let notified = shutdown.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut runs: JoinSet<()> = JoinSet::new();

            loop {
                tokio::select! {
                    _ = &mut notified => {
                        info!("scrape loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let this = Arc::clone(&self);
                        runs.spawn(async move {
                            this.run_once().await;
                        });
                    }
                    Some(joined) = runs.join_next(), if !runs.is_empty() => {
                        if let Err(e) = joined {
                            if e.is_panic() {
                                error!("scrape run panicked: {e}");
                            }
                        }
                    }
                }
            }

            runs.shutdown().await;
        })
    }
}
