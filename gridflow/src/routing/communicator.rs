/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Channels between partitions.
//!
//! Every partition of an operation owns one inbound channel. The
//! partitions it is connected to hold the sending halves; a partition
//! sends to another by linear partition index. The channel closes once
//! every connected partition dropped its sender. Routing connects
//! neighbours only, route walks connect every pair of partitions.

use std::collections::HashMap;
use std::time::Duration;

use gridslice::Index;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::error::Result;
use crate::tiling::Tiling;

/// The endpoint of one partition.
#[derive(Debug)]
pub(crate) struct Communicator<M> {
    partition: Index,
    receiver: mpsc::UnboundedReceiver<M>,
    senders: HashMap<usize, mpsc::UnboundedSender<M>>,
    timeout: Duration,
}

impl<M: Send + 'static> Communicator<M> {
    /// The endpoints of all partitions of `tiling`, connected to their
    /// (at most 8) neighbours, in linear partition order.
    pub(crate) fn connect(tiling: &Tiling, timeout: Duration) -> Vec<Self> {
        Self::connect_with(tiling, timeout, |partition| {
            NEIGHBOUR_OFFSETS
                .iter()
                .filter_map(|offset| tiling.neighbour(partition, offset))
                .collect()
        })
    }

    /// The endpoints of all partitions of `tiling`, each connected to
    /// every other partition.
    pub(crate) fn connect_all(tiling: &Tiling, timeout: Duration) -> Vec<Self> {
        let nr_partitions = tiling.nr_partitions();
        Self::connect_with(tiling, timeout, |partition| {
            (0..nr_partitions).filter(|&other| other != partition).collect()
        })
    }

    fn connect_with(
        tiling: &Tiling,
        timeout: Duration,
        peers: impl Fn(usize) -> Vec<usize>,
    ) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..tiling.nr_partitions())
            .map(|_| mpsc::unbounded_channel())
            .unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(partition, receiver)| {
                let senders = peers(partition)
                    .into_iter()
                    .map(|peer| (peer, senders[peer].clone()))
                    .collect();
                Communicator {
                    partition: tiling.partition_origin(partition),
                    receiver,
                    senders,
                    timeout,
                }
            })
            .collect()
    }

    /// Send `message` to `partition`. A partition that already finished
    /// does not expect more messages, so a closed channel is not an
    /// error here.
    pub(crate) fn send(&self, partition: usize, message: M) -> Result<()> {
        let sender = self.senders.get(&partition).ok_or_else(|| {
            Error::invalid_argument(format!(
                "partition {:?} is not connected to partition {:?}",
                partition, self.partition
            ))
        })?;
        if sender.send(message).is_err() {
            tracing::debug!(partition = ?self.partition, peer = partition, "peer stopped receiving");
        }
        Ok(())
    }

    /// Wait for the next message.
    pub(crate) async fn receive(&mut self) -> Result<M> {
        match tokio::time::timeout(self.timeout, self.receiver.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(Error::ChannelClosed {
                partition: self.partition.clone(),
            }),
            Err(_) => {
                tracing::warn!(
                    partition = ?self.partition,
                    waited = ?self.timeout,
                    "no message received from other partitions"
                );
                Err(Error::NonTerminatingFlowGraph {
                    partition: self.partition.clone(),
                    waited: self.timeout,
                })
            }
        }
    }

    /// Stop sending: partitions waiting only on this partition see
    /// their channel close.
    pub(crate) fn close(&mut self) {
        self.senders.clear();
    }
}

const NEIGHBOUR_OFFSETS: [[isize; 2]; 8] = [
    [-1, -1],
    [-1, 0],
    [-1, 1],
    [0, -1],
    [0, 1],
    [1, -1],
    [1, 0],
    [1, 1],
];

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::runtime::Placement;

    fn tiling() -> Tiling {
        Tiling::regular(&shape![4, 4], &shape![2, 2], 1, Placement::Blocked).unwrap()
    }

    #[tokio::test]
    async fn test_send_receive() {
        let mut communicators = Communicator::<u32>::connect(&tiling(), Duration::from_secs(5));
        assert_eq!(communicators.len(), 4);
        communicators[0].send(3, 42).unwrap();
        communicators[1].send(3, 43).unwrap();
        assert_eq!(communicators[3].receive().await.unwrap(), 42);
        assert_eq!(communicators[3].receive().await.unwrap(), 43);
        assert!(communicators[0].send(0, 1).is_err());
    }

    #[tokio::test]
    async fn test_connect_all() {
        let tiling = Tiling::regular(&shape![6, 2], &shape![2, 2], 1, Placement::Blocked).unwrap();
        assert!(Communicator::<u32>::connect(&tiling, Duration::from_secs(5))[0].send(2, 1).is_err());

        let mut communicators = Communicator::<u32>::connect_all(&tiling, Duration::from_secs(5));
        communicators[0].send(2, 7).unwrap();
        assert_eq!(communicators[2].receive().await.unwrap(), 7);
        assert!(communicators[2].send(2, 1).is_err());
    }

    #[tokio::test]
    async fn test_closed() {
        let mut communicators = Communicator::<u32>::connect(&tiling(), Duration::from_secs(5));
        let mut last = communicators.pop().unwrap();
        for communicator in &mut communicators {
            communicator.close();
        }
        assert_eq!(
            last.receive().await,
            Err(Error::ChannelClosed {
                partition: vec![2, 2]
            })
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut communicators = Communicator::<u32>::connect(&tiling(), Duration::from_millis(10));
        assert!(matches!(
            communicators[0].receive().await,
            Err(Error::NonTerminatingFlowGraph { .. })
        ));
    }
}
