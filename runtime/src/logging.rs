// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber setup.

use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` is honored; the crate's own
/// level defaults to `info`, or `debug` when `verbose` is set.
pub fn init(verbose: bool, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(default_directive(verbose));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn default_directive(verbose: bool) -> Directive {
    let level = if verbose { "debug" } else { "info" };
    format!("ratekeeper={level}")
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false).to_string(), "ratekeeper=info");
        assert_eq!(default_directive(true).to_string(), "ratekeeper=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(false, false);
        init(true, true);
    }
}
