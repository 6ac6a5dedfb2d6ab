// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Normalizes locale-formatted rate text into a number.

use crate::error::ParseError;

/// Parse rate text such as `"92,5"` or `"92.5"`.
///
/// The decimal comma is replaced with a point before parsing. Values that
/// are not finite or not strictly positive are rejected.
pub fn parse_rate(raw: &str) -> Result<f64, ParseError> {
    let normalized = raw.trim().replacen(',', ".", 1);

    let value: f64 = normalized
        .parse()
        .map_err(|_| ParseError::NotANumber(raw.to_string()))?;

    if value.is_nan() {
        return Err(ParseError::NotANumber(raw.to_string()));
    }
    if !value.is_finite() {
        return Err(ParseError::NotFinite(raw.to_string()));
    }
    if value <= 0.0 {
        return Err(ParseError::NotPositive(value));
    }

    Ok(value)
}
