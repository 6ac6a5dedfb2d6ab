// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Service configuration, read from the environment.
//!
//! Unset or unparsable values fall back to their defaults. Semantic checks
//! happen separately in [`Config::validate`].

use crate::error::ConfigError;
use crate::fetcher::FetchTimeouts;
use crate::query::DEFAULT_FALLBACK_RATE;
use crate::scheduler::ScrapeTarget;
use crate::store::DEFAULT_RETENTION;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SCRAPE_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 61_000;
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TARGET_URL: &str = "https://rapira.org/exchange/USDT_RUB";
pub const DEFAULT_TARGET_SELECTOR: &str = "span.me-2";
pub const DEFAULT_SOURCE_LABEL: &str = "Rapira";
pub const DEFAULT_DB_PATH: &str = "./rates.db";
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub scrape_interval: Duration,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub retained_records: usize,
    pub fallback_rate: f64,
    pub target_url: String,
    pub target_selector: String,
    pub source_label: String,
    pub db_path: PathBuf,
    pub chromium_path: Option<PathBuf>,
    pub failure_alert_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader(lookup);

        Self {
            host: env
                .parsed("RATEKEEPER_HOST")
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: env.parsed("PORT").unwrap_or(DEFAULT_PORT),
            scrape_interval: Duration::from_millis(
                env.parsed("RATEKEEPER_SCRAPE_INTERVAL_MS")
                    .unwrap_or(DEFAULT_SCRAPE_INTERVAL_MS),
            ),
            navigation_timeout: Duration::from_millis(
                env.parsed("RATEKEEPER_NAVIGATION_TIMEOUT_MS")
                    .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
            ),
            selector_timeout: Duration::from_millis(
                env.parsed("RATEKEEPER_SELECTOR_TIMEOUT_MS")
                    .unwrap_or(DEFAULT_SELECTOR_TIMEOUT_MS),
            ),
            retained_records: env
                .parsed::<usize>("RATEKEEPER_RETAINED_RECORDS")
                .unwrap_or(DEFAULT_RETENTION)
                .max(1),
            fallback_rate: env
                .parsed("RATEKEEPER_FALLBACK_RATE")
                .unwrap_or(DEFAULT_FALLBACK_RATE),
            target_url: env
                .string("RATEKEEPER_TARGET_URL")
                .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
            target_selector: env
                .string("RATEKEEPER_TARGET_SELECTOR")
                .unwrap_or_else(|| DEFAULT_TARGET_SELECTOR.to_string()),
            source_label: env
                .string("RATEKEEPER_SOURCE_LABEL")
                .unwrap_or_else(|| DEFAULT_SOURCE_LABEL.to_string()),
            db_path: env
                .string("RATEKEEPER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            chromium_path: env.string("RATEKEEPER_CHROMIUM_PATH").map(PathBuf::from),
            failure_alert_threshold: env
                .parsed::<u32>("RATEKEEPER_FAILURE_ALERT_THRESHOLD")
                .unwrap_or(DEFAULT_FAILURE_ALERT_THRESHOLD)
                .max(1),
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.target_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.target_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.target_url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        if self.target_selector.trim().is_empty() {
            return Err(ConfigError::EmptySelector);
        }
        if !self.fallback_rate.is_finite() || self.fallback_rate <= 0.0 {
            return Err(ConfigError::InvalidFallback(self.fallback_rate));
        }

        for (name, value) in [
            ("scrape interval", self.scrape_interval),
            ("navigation timeout", self.navigation_timeout),
            ("selector timeout", self.selector_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn fetch_timeouts(&self) -> FetchTimeouts {
        FetchTimeouts {
            navigation: self.navigation_timeout,
            selector: self.selector_timeout,
        }
    }

    pub fn scrape_target(&self) -> ScrapeTarget {
        ScrapeTarget {
            url: self.target_url.clone(),
            selector: self.target_selector.clone(),
            source: self.source_label.clone(),
        }
    }
}

struct EnvReader<F>(F);

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, `None` when unset or blank.
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.string(name).and_then(|v| v.parse::<T>().ok())
    }
}
