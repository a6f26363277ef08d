/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Routing over flow direction networks containing cycles must fail,
//! never hang.

use std::time::Duration;

use bounded_test::bounded_test;
use gridflow::Config;
use gridflow::Error;
use gridflow::PartitionedArray;
use gridflow::Runtime;
use gridflow::routing;
use gridflow::test_utils;
use gridslice::shape;

// Cells 1 and 2 drain into each other across the partition boundary.
const CROSS_PARTITION_CYCLE: [u8; 4] = [5, 6, 4, 5];
// Cells 0 and 1 drain into each other within the first partition.
const LOCAL_CYCLE: [u8; 4] = [6, 4, 5, 5];

fn flow_direction(runtime: &Runtime, codes: [u8; 4]) -> PartitionedArray<u8> {
    PartitionedArray::from_buffer(runtime, shape![1, 4], shape![1, 2], codes.to_vec()).unwrap()
}

fn unvalidated_runtime(timeout: Duration) -> Runtime {
    let mut config = Config::default();
    config.set_nr_localities(2);
    config.set_validate_flow_direction(false);
    config.set_channel_receive_timeout(timeout);
    Runtime::new(&config).unwrap()
}

#[bounded_test(timeout_secs = 30)]
async fn test_validation_reports_cycle() {
    let runtime = test_utils::runtime(2);
    let flow_direction = flow_direction(&runtime, CROSS_PARTITION_CYCLE);

    let result = routing::accu(&flow_direction, 1.0f64).unwrap().to_buffer().await;
    match result {
        Err(Error::FlowDirectionCycle { cell }) => {
            assert!(cell == vec![0, 1] || cell == vec![0, 2], "cell {:?}", cell)
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(
        routing::validate_flow_direction(&flow_direction)
            .await
            .is_err()
    );
}

#[bounded_test(timeout_secs = 30)]
async fn test_unvalidated_cycle_times_out() {
    let runtime = unvalidated_runtime(Duration::from_millis(500));
    let flow_direction = flow_direction(&runtime, CROSS_PARTITION_CYCLE);

    let result = routing::accu(&flow_direction, 1.0f64).unwrap().to_buffer().await;
    assert!(
        matches!(
            result,
            Err(Error::NonTerminatingFlowGraph { .. }) | Err(Error::ChannelClosed { .. })
        ),
        "{:?}",
        result
    );
}

#[bounded_test(timeout_secs = 30)]
async fn test_unvalidated_local_cycle() {
    let runtime = unvalidated_runtime(Duration::from_secs(10));
    let flow_direction = flow_direction(&runtime, LOCAL_CYCLE);

    let result = routing::inflow_count(&flow_direction).unwrap().to_buffer().await;
    assert_eq!(result.unwrap(), vec![1, 1, 0, 0]);

    let result = routing::accu(&flow_direction, 1.0f64).unwrap().to_buffer().await;
    assert!(
        matches!(result, Err(Error::FlowDirectionCycle { .. })),
        "{:?}",
        result
    );
}

#[bounded_test(timeout_secs = 30)]
async fn test_acyclic_network_validates() {
    let runtime = test_utils::runtime(2);
    let flow_direction = flow_direction(&runtime, [6, 6, 6, 5]);
    routing::validate_flow_direction(&flow_direction).await.unwrap();
    assert_eq!(
        routing::accu(&flow_direction, 1.0f64).unwrap().to_buffer().await.unwrap(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
}
