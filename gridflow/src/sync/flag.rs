/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! One-shot flags. A flag is raised when its guard goes away, however
//! that happens: an explicit [`Guard::signal`], a plain drop, or the
//! unwinding of the task owning the guard. Task groups hold the guard
//! in their running state, so that waiters wake exactly when the group
//! stops.
//!
//! ```
//! # use gridflow::sync::flag;
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let (flag, guard) = flag::guarded();
//! let waiter = tokio::spawn({
//!     let flag = flag.clone();
//!     async move { flag.wait().await }
//! });
//! guard.signal();
//! waiter.await.unwrap();
//! assert!(flag.signalled());
//! # })
//! ```

use tokio::sync::watch;

/// A lowered flag and the guard raising it.
pub fn guarded() -> (Flag, Guard) {
    let (sender, receiver) = watch::channel(false);
    (Flag(receiver), Guard(sender))
}

/// The waiting side. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct Flag(watch::Receiver<bool>);

impl Flag {
    pub fn signalled(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until the flag is raised. Returns immediately if it already
    /// is.
    pub async fn wait(&self) {
        let mut receiver = self.0.clone();
        // The guard raises the flag before the sender goes away, so an
        // error here still means the flag is up.
        let _ = receiver.wait_for(|&raised| raised).await;
    }
}

/// Raises its flag when dropped.
#[derive(Debug)]
pub struct Guard(watch::Sender<bool>);

impl Guard {
    /// Raise the flag now.
    pub fn signal(self) {}
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_raised_by_drop() {
        let (flag, guard) = guarded();
        assert!(!flag.signalled());
        drop(guard);
        assert!(flag.signalled());
        flag.wait().await;
    }

    #[tokio::test]
    async fn test_waiters_wake_together() {
        let (flag, guard) = guarded();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let flag = flag.clone();
                tokio::spawn(async move { flag.wait().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|waiter| !waiter.is_finished()));
        guard.signal();
        for waiter in waiters {
            waiter.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_raised_by_panicking_owner() {
        let (flag, guard) = guarded();
        let owner = tokio::spawn(async move {
            let _guard = guard;
            panic!("owner failed");
        });
        assert!(owner.await.is_err());
        flag.wait().await;
        assert!(flag.signalled());
    }
}
