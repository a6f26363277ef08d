/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Helpers for tests.

use tracing::Level;

use crate::config::Config;
use crate::runtime::Runtime;

/// Set up a tracing subscriber with a filter, so that tracing logs at
/// `level` or above are printed. Does nothing if a global subscriber
/// is already installed.
pub fn set_tracing_env_filter(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level.as_str()))
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A runtime with `nr_localities` localities of two worker threads each.
pub fn runtime(nr_localities: usize) -> Runtime {
    let mut config = Config::default();
    config.set_nr_localities(nr_localities);
    config.set_worker_threads_per_locality(2);
    Runtime::new(&config).expect("failed to create test runtime")
}

/// A runtime whose channel waits give up after `timeout`.
pub fn runtime_with_timeout(nr_localities: usize, timeout: std::time::Duration) -> Runtime {
    let mut config = Config::default();
    config.set_nr_localities(nr_localities);
    config.set_channel_receive_timeout(timeout);
    Runtime::new(&config).expect("failed to create test runtime")
}
