/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Localities and the runtime that owns them.
//!
//! A [`Runtime`] is a fixed set of localities. Each locality is a
//! multi-threaded tokio runtime; partition tasks are spawned on the
//! locality that owns the partition they produce. Data crossing
//! localities is transferred by value.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use gridslice::Shape;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Error;
use crate::error::Result;

/// How partitions are assigned to localities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Contiguous ranges of the linear partition index.
    #[default]
    Blocked,
    /// Partition `i` goes to locality `i % nr_localities`.
    RoundRobin,
    /// Contiguous ranges along a Hilbert curve over a 2-D partition
    /// grid. Other ranks fall back to [`Placement::Blocked`].
    Hilbert,
}

impl Placement {
    /// The locality of each partition of a partition grid, in linear
    /// partition order.
    pub fn assign(&self, grid: &Shape, nr_localities: usize) -> Vec<usize> {
        let nr_partitions = grid.volume();
        let nr_localities = nr_localities.max(1);
        let blocked = |rank: usize| rank * nr_localities / nr_partitions.max(1);
        match self {
            Placement::Blocked => (0..nr_partitions).map(blocked).collect(),
            Placement::RoundRobin => (0..nr_partitions).map(|i| i % nr_localities).collect(),
            Placement::Hilbert if grid.rank() == 2 => {
                let (rows, cols) = (grid.extent(0), grid.extent(1));
                let side = rows.max(cols).next_power_of_two();
                let mut order: Vec<usize> = (0..nr_partitions).collect();
                order.sort_by_key(|&i| hilbert_distance(side, i / cols, i % cols));
                let mut localities = vec![0; nr_partitions];
                for (rank, partition) in order.into_iter().enumerate() {
                    localities[partition] = blocked(rank);
                }
                localities
            }
            Placement::Hilbert => Placement::Blocked.assign(grid, nr_localities),
        }
    }
}

/// Distance of cell `(row, col)` along the Hilbert curve filling a
/// `side` x `side` square, `side` a power of two.
fn hilbert_distance(side: usize, row: usize, col: usize) -> usize {
    let (mut x, mut y) = (col, row);
    let mut distance = 0;
    let mut s = side / 2;
    while s > 0 {
        let rx = usize::from(x & s > 0);
        let ry = usize::from(y & s > 0);
        distance += s * s * ((3 * rx) ^ ry);
        if ry == 0 {
            if rx == 1 {
                x = side - 1 - x;
                y = side - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    distance
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Blocked => write!(f, "blocked"),
            Placement::RoundRobin => write!(f, "round_robin"),
            Placement::Hilbert => write!(f, "hilbert"),
        }
    }
}

impl FromStr for Placement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "blocked" => Ok(Placement::Blocked),
            "round_robin" | "roundrobin" => Ok(Placement::RoundRobin),
            "hilbert" => Ok(Placement::Hilbert),
            other => Err(Error::Config(format!("unknown placement {:?}", other))),
        }
    }
}

/// A worker owning a subset of partitions.
struct Locality {
    runtime: Option<tokio::runtime::Runtime>,
    handle: tokio::runtime::Handle,
}

impl Drop for Locality {
    fn drop(&mut self) {
        // Blocking shutdown is not allowed inside an async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

struct Inner {
    config: Config,
    localities: Vec<Locality>,
}

/// A set of localities executing partition tasks. Cloning a runtime is
/// cheap; the localities shut down when the last clone is dropped.
#[derive(Clone)]
pub struct Runtime(Arc<Inner>);

impl Runtime {
    /// Start `config.nr_localities()` localities.
    pub fn new(config: &Config) -> Result<Self> {
        let config = config.resolved();
        let localities = (0..config.nr_localities())
            .map(|id| {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(config.worker_threads_per_locality())
                    .thread_name(format!("gridflow-locality-{}", id))
                    .enable_all()
                    .build()
                    .map_err(|err| {
                        Error::Config(format!("failed to start locality {}: {}", id, err))
                    })?;
                let handle = runtime.handle().clone();
                Ok(Locality {
                    runtime: Some(runtime),
                    handle,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            nr_localities = localities.len(),
            worker_threads = config.worker_threads_per_locality(),
            "started runtime"
        );
        Ok(Runtime(Arc::new(Inner { config, localities })))
    }

    /// A runtime with a single locality and default settings.
    pub fn local() -> Result<Self> {
        Self::new(&Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn nr_localities(&self) -> usize {
        self.0.localities.len()
    }

    /// The handle of `locality`, wrapping around the number of localities.
    pub(crate) fn handle(&self, locality: usize) -> &tokio::runtime::Handle {
        &self.0.localities[locality % self.0.localities.len()].handle
    }

    /// Spawn `future` on `locality`.
    pub fn spawn_at<F, T>(&self, locality: usize, future: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        TaskHandle(self.handle(locality).spawn(future))
    }

    /// Whether two runtimes are the same.
    pub fn same(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nr_localities", &self.nr_localities())
            .finish()
    }
}

/// A task spawned on a locality. Awaiting the handle yields the task's
/// result; an aborted task yields [`Error::Cancelled`] and a panicking
/// task yields [`Error::TaskFailed`].
#[derive(Debug)]
pub struct TaskHandle<T>(JoinHandle<Result<T>>);

impl<T> TaskHandle<T> {
    pub fn abort(&self) {
        self.0.abort()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.0.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| match result {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(Error::Cancelled),
            Err(err) => Err(Error::TaskFailed {
                partition: vec![],
                reason: err.to_string(),
            }),
        })
    }
}

/// Aborts the tasks it tracks when dropped. Aborting a finished task
/// has no effect.
#[derive(Debug, Default)]
pub(crate) struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    pub(crate) fn track<T>(&mut self, task: &TaskHandle<T>) {
        self.0.push(task.abort_handle());
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}
