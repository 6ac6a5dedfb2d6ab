// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Current-rate lookup with a degraded fallback.
//!
//! Always produces an answer: the newest stored record when there is one,
//! otherwise the configured fallback rate flagged as degraded.

use crate::store::RateStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Rate served when nothing has been captured yet.
pub const DEFAULT_FALLBACK_RATE: f64 = 92.5;

/// Source label attached to the fallback rate.
pub const FALLBACK_SOURCE: &str = "Fallback";

/// What a consumer gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentRate {
    pub rate: f64,
    pub source: String,
    /// Capture time of the stored record; absent for the fallback.
    pub captured_at: Option<DateTime<Utc>>,
    /// True when the value is the fallback rather than real data.
    pub degraded: bool,
}

impl CurrentRate {
    fn fallback(rate: f64) -> Self {
        Self {
            rate,
            source: FALLBACK_SOURCE.to_string(),
            captured_at: None,
            degraded: true,
        }
    }
}

pub struct QueryService {
    store: Arc<RateStore>,
    fallback_rate: f64,
}

impl QueryService {
    pub fn new(store: Arc<RateStore>, fallback_rate: f64) -> Self {
        Self {
            store,
            fallback_rate,
        }
    }

    /// The degraded answer, independent of the store.
    pub fn fallback(&self) -> CurrentRate {
        CurrentRate::fallback(self.fallback_rate)
    }

    /// The latest stored rate, or the fallback when none is available.
    ///
    /// A store read error is treated like an empty store.
    pub fn current_rate(&self) -> CurrentRate {
        match self.store.latest() {
            Ok(Some(record)) => CurrentRate {
                rate: record.rate,
                source: record.source,
                captured_at: Some(record.captured_at),
                degraded: false,
            },
            Ok(None) => self.fallback(),
            Err(e) => {
                warn!("failed to read latest rate, serving fallback: {e}");
                self.fallback()
            }
        }
    }
}
