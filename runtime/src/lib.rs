// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ratekeeper runtime library — periodic exchange-rate scraper.
//!
//! A headless browser pulls one rate off a web page on a fixed interval.
//! Each value is parsed, stored in a small SQLite history that keeps only
//! the newest records, and served over HTTP with a fallback when no data
//! exists yet.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod parser;
pub mod query;
pub mod renderer;
pub mod rest;
pub mod scheduler;
pub mod store;
