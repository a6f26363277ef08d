/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Task groups track the partition tasks of one operation. A group
//! shares the fate of its tasks: the first failing task stops the group
//! and aborts the tasks that are still pending.
//!
//! ```
//! # use gridflow::Runtime;
//! # use gridflow::sync::group::Status;
//! # use gridflow::sync::group::TaskGroup;
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let runtime = Runtime::local().unwrap();
//! let group = TaskGroup::new("example");
//! let task = group.spawn(&runtime, 0, vec![0], async { Ok(42) });
//! group.close();
//! assert_eq!(task.await.unwrap(), 42);
//! group.wait().await.unwrap();
//! assert_eq!(group.status(), Status::Completed);
//! # })
//! ```

// EnumAsInner generates code that triggers a false positive
// unused_assignments lint on struct variant fields.
#![allow(unused_assignments)]

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;

use enum_as_inner::EnumAsInner;
use futures::FutureExt;
use gridslice::Index;
use tokio::task::AbortHandle;

use crate::error::Error;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::runtime::TaskHandle;
use crate::sync::flag;

/// The status of a group. Groups start out in [`Status::Running`]
/// and transition exactly once to one of the other states.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// Tasks are pending, or more may be spawned.
    Running,
    /// One of the tasks failed, and the pending tasks were aborted.
    Failed,
    /// The group was cancelled, and the pending tasks were aborted.
    Cancelled,
    /// The group was closed and all of its tasks succeeded.
    Completed,
}

#[derive(EnumAsInner, Debug)]
enum State {
    Running {
        _guard: flag::Guard,
        tasks: Vec<AbortHandle>,
        pending: usize,
        closed: bool,
    },
    Stopped {
        status: Status,
        error: Option<Error>,
    },
}

impl State {
    fn stop(&mut self, status: Status, error: Option<Error>) {
        if let State::Running { tasks, .. } = self {
            let current = tokio::task::try_id();
            for task in tasks.iter() {
                if Some(task.id()) != current {
                    task.abort();
                }
            }
            // Dropping the guard notifies waiters.
            *self = State::Stopped { status, error };
        }
    }

    fn status(&self) -> Status {
        match self {
            State::Running { .. } => Status::Running,
            State::Stopped { status, .. } => *status,
        }
    }

    fn finish_task<T>(&mut self, op: &'static str, partition: &Index, result: &Result<T>) {
        let (pending, closed) = match self.as_running_mut() {
            Some((_, _, pending, closed)) => {
                *pending -= 1;
                (*pending, *closed)
            }
            None => return,
        };
        match result {
            Err(err) if err.is_cancelled() => self.stop(Status::Cancelled, Some(err.clone())),
            Err(err) => {
                tracing::error!(op, ?partition, "partition task failed: {}", err);
                self.stop(Status::Failed, Some(err.clone()))
            }
            Ok(_) if closed && pending == 0 => self.stop(Status::Completed, None),
            Ok(_) => {}
        }
    }
}

/// The partition tasks of one operation. Cloning a group yields
/// another handle to the same group; dropping handles does not abort
/// the tasks.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    op: &'static str,
    state: Arc<Mutex<State>>,
    flag: flag::Flag,
}

impl TaskGroup {
    pub fn new(op: &'static str) -> Self {
        let (flag, guard) = flag::guarded();
        let state = Arc::new(Mutex::new(State::Running {
            _guard: guard,
            tasks: Vec::new(),
            pending: 0,
            closed: false,
        }));
        Self { op, state, flag }
    }

    /// A group with no tasks that has already completed.
    pub fn completed(op: &'static str) -> Self {
        let group = Self::new(op);
        group.close();
        group
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    /// Spawn a task for `partition` on `locality`. If the task fails the
    /// group fails. Tasks spawned onto a stopped group never run; their
    /// handles yield [`Error::Cancelled`].
    pub fn spawn<F, T>(
        &self,
        runtime: &Runtime,
        locality: usize,
        partition: Index,
        future: F,
    ) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let running = match self.state.lock().unwrap().as_running_mut() {
            Some((_, _, pending, _)) => {
                *pending += 1;
                true
            }
            None => false,
        };
        if !running {
            return runtime.spawn_at(locality, async { Err(Error::Cancelled) });
        }

        let state = Arc::clone(&self.state);
        let op = self.op;
        let task = runtime.spawn_at(locality, async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::TaskFailed {
                    partition: partition.clone(),
                    reason: panic_message(&*panic),
                }),
            };
            state.lock().unwrap().finish_task(op, &partition, &result);
            result
        });

        match self.state.lock().unwrap().as_running_mut() {
            Some((_, tasks, _, _)) => tasks.push(task.abort_handle()),
            None => task.abort(),
        }
        task
    }

    /// Declare that no more tasks will be spawned. The group completes
    /// once all of its tasks have succeeded.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        let idle = match state.as_running_mut() {
            Some((_, _, pending, closed)) => {
                *closed = true;
                *pending == 0
            }
            None => false,
        };
        if idle {
            state.stop(Status::Completed, None);
        }
    }

    /// Cancel the group, aborting all pending tasks. Tasks that already
    /// completed keep their results.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        if state.is_running() {
            tracing::debug!(op = self.op, "cancelling operation");
            state.stop(Status::Cancelled, Some(Error::Cancelled));
        }
    }

    /// Fail the group with `error`, as if one of its tasks had failed.
    pub fn fail(&self, error: Error) {
        self.state.lock().unwrap().stop(Status::Failed, Some(error));
    }

    pub fn status(&self) -> Status {
        self.state.lock().unwrap().status()
    }

    /// The error that stopped the group, if any.
    pub fn error(&self) -> Option<Error> {
        match &*self.state.lock().unwrap() {
            State::Stopped { error, .. } => error.clone(),
            State::Running { .. } => None,
        }
    }

    /// Wait for the group to stop.
    pub async fn wait(&self) -> Result<()> {
        self.flag.wait().await;
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_basic() {
        let runtime = Runtime::local().unwrap();
        let group = TaskGroup::new("test");
        assert_eq!(group.status(), Status::Running);
        let a = group.spawn(&runtime, 0, vec![0], async { Ok(1) });
        let b = group.spawn(&runtime, 0, vec![1], async { Ok(2) });
        assert_eq!(a.await.unwrap() + b.await.unwrap(), 3);
        // Not closed yet.
        assert_eq!(group.status(), Status::Running);
        group.close();
        group.wait().await.unwrap();
        assert_eq!(group.status(), Status::Completed);
    }

    #[tokio::test]
    async fn test_empty_group() {
        let group = TaskGroup::completed("test");
        assert_eq!(group.status(), Status::Completed);
        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_aborts_siblings() {
        let runtime = Runtime::local().unwrap();
        let group = TaskGroup::new("test");
        let slow = group.spawn(&runtime, 0, vec![0], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let failing = group.spawn(&runtime, 0, vec![1], async {
            Err::<(), _>(Error::invalid_argument("bad"))
        });
        group.close();

        assert!(matches!(failing.await, Err(Error::InvalidArgument { .. })));
        assert_eq!(slow.await, Err(Error::Cancelled));
        assert!(matches!(
            group.wait().await,
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(group.status(), Status::Failed);

        // Spawning onto a stopped group never runs the task.
        let late = group.spawn(&runtime, 0, vec![2], async { Ok(()) });
        assert_eq!(late.await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed() {
        let runtime = Runtime::local().unwrap();
        let group = TaskGroup::new("test");
        let done = group.spawn(&runtime, 0, vec![0], async { Ok(7) });
        let done = done.await;
        let pending = group.spawn(&runtime, 0, vec![1], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        });
        group.cancel();
        assert_eq!(done, Ok(7));
        assert_eq!(pending.await, Err(Error::Cancelled));
        assert_eq!(group.status(), Status::Cancelled);
        assert_eq!(group.wait().await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_panic_fails_group() {
        let runtime = Runtime::local().unwrap();
        let group = TaskGroup::new("test");
        let task = group.spawn(&runtime, 0, vec![3, 4], async {
            if true {
                panic!("out of cheese");
            }
            Ok(())
        });
        group.close();
        match task.await {
            Err(Error::TaskFailed { partition, reason }) => {
                assert_eq!(partition, vec![3, 4]);
                assert!(reason.contains("out of cheese"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(group.status(), Status::Failed);
    }
}
