/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Logging setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

/// Install a global `fmt` subscriber writing to stderr, with the log
/// level taken from the environment configuration.
pub fn initialize_logging() {
    initialize_logging_with_config(&Config::from_env());
}

/// Install a global `fmt` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG` if set, otherwise from the
/// configured log level. Only the first call has an effect; later
/// calls, or calls made after another global subscriber was installed,
/// are ignored.
pub fn initialize_logging_with_config(config: &Config) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.log_level()))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let result = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init();
        if let Err(err) = result {
            tracing::debug!("logging already initialized: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_twice() {
        let mut config = Config::default();
        config.set_log_level("not a filter [");
        initialize_logging_with_config(&config);
        initialize_logging();
        tracing::info!("still logging");
    }
}
