// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for a scrape run.
//!
//! Every failure a run can hit falls into one of three families (fetch,
//! parse, persistence). None of them is fatal to the process: the run
//! aborts, nothing is written, and the next tick tries again.

/// Failure to retrieve the raw rate text from the target page.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("navigation timed out after {timeout_ms}ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("selector `{selector}` not found after {timeout_ms}ms")]
    SelectorNotFound { selector: String, timeout_ms: u64 },

    #[error("selector `{selector}` matched but has no text")]
    NoTextContent { selector: String },

    /// The browser session could not be launched or broke mid-run.
    #[error("browser error: {0}")]
    Browser(String),
}

/// Raw text that does not describe a usable rate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("not a number: {0:?}")]
    NotANumber(String),

    #[error("not a finite number: {0:?}")]
    NotFinite(String),

    #[error("rate must be positive, got {0}")]
    NotPositive(f64),
}

/// The rate store could not complete a read or write.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("refusing to store invalid rate {0}")]
    InvalidRate(f64),

    #[error("stored timestamp is malformed: {0}")]
    Timestamp(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure that aborts a single scrape run.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl ScrapeError {
    /// Short stage label used in logs and the health report.
    pub fn stage(&self) -> &'static str {
        match self {
            ScrapeError::Fetch(_) => "fetch",
            ScrapeError::Parse(_) => "parse",
            ScrapeError::Persistence(_) => "persistence",
        }
    }
}

/// Invalid service configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("target selector must not be empty")]
    EmptySelector,

    #[error("fallback rate must be a positive finite number, got {0}")]
    InvalidFallback(f64),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
