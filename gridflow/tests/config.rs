/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::io::Write;
use std::time::Duration;

use gridflow::Config;
use gridflow::Error;
use gridflow::Placement;
use gridflow::Runtime;
use gridflow::create_partitioned_array;
use gridflow::global;
use gridslice::Shape;
use gridslice::shape;
use indoc::indoc;
use tempfile::NamedTempFile;

const CONFIG: &str = indoc! {"
    nr_localities: 3
    partition_shape: [16, 8]
    placement: round_robin
    channel_receive_timeout_ms: 1500
    validate_flow_direction: false
    log_level: debug
"};

fn config_file(contents: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_from_yaml() -> anyhow::Result<()> {
    let file = config_file(CONFIG)?;
    let config = Config::from_yaml(file.path())?;

    assert_eq!(config.nr_localities(), 3);
    assert_eq!(config.partition_shape(), Shape::from(vec![16, 8]));
    assert_eq!(config.placement(), Placement::RoundRobin);
    assert_eq!(config.channel_receive_timeout(), Duration::from_millis(1500));
    assert!(!config.validate_flow_direction());
    assert_eq!(config.log_level(), "debug");
    // Keys not in the file keep their defaults.
    assert_eq!(config.worker_threads_per_locality(), 2);
    Ok(())
}

#[test]
fn test_load_without_file() {
    let config = Config::load(None).unwrap();
    assert!(config.nr_localities() >= 1);
}

#[test]
fn test_load_file() -> anyhow::Result<()> {
    let file = config_file(indoc! {"
        partition_shape: [32, 32]
        channel_receive_timeout_ms: 100
    "})?;
    let config = Config::load(Some(file.path()))?;
    assert_eq!(config.channel_receive_timeout(), Duration::from_millis(100));
    Ok(())
}

#[test]
fn test_to_yaml_round_trip() -> anyhow::Result<()> {
    let config = Config::from_yaml_str(CONFIG)?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("gridflow.yaml");
    config.to_yaml(&path)?;
    assert_eq!(Config::from_yaml(&path)?, config);
    Ok(())
}

#[test]
fn test_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::from_yaml(dir.path().join("missing.yaml")),
        Err(Error::Config(_))
    ));

    let file = config_file("placement: diagonal\n").unwrap();
    assert!(matches!(Config::from_yaml(file.path()), Err(Error::Config(_))));

    let file = config_file("nr_localities: [1, 2]\n").unwrap();
    assert!(Config::from_yaml(file.path()).is_err());
}

#[tokio::test]
async fn test_runtime_from_file() -> anyhow::Result<()> {
    let file = config_file(CONFIG)?;
    let config = Config::from_yaml(file.path())?;
    let runtime = Runtime::new(&config)?;
    assert_eq!(runtime.nr_localities(), 3);

    let array = create_partitioned_array(&runtime, shape![40, 20], config.partition_shape(), 1u32)?;
    assert_eq!(array.nr_partitions(), 2 * 2);
    assert_eq!(global::sum(&array).await?, 800);
    Ok(())
}
