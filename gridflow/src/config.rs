/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for gridflow.
//!
//! A [`Config`] is built in layers: built-in defaults, then an optional
//! YAML file, then `GRIDFLOW_*` environment variables. Each layer only
//! overrides the keys it sets. Values that fail to parse are logged and
//! ignored.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use gridslice::Shape;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::runtime::Placement;

const DEFAULT_NR_LOCALITIES: usize = 1;
const DEFAULT_WORKER_THREADS: usize = 2;
const DEFAULT_PARTITION_EXTENT: usize = 256;
const DEFAULT_CHANNEL_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration for a gridflow runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    nr_localities: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_threads_per_locality: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition_shape: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placement: Option<Placement>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "duration_millis",
        rename = "channel_receive_timeout_ms"
    )]
    channel_receive_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validate_flow_direction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `GRIDFLOW_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = parse_env("GRIDFLOW_NR_LOCALITIES", |s| s.parse::<usize>().ok()) {
            config.nr_localities = Some(value);
        }
        if let Some(value) = parse_env("GRIDFLOW_WORKER_THREADS", |s| s.parse::<usize>().ok()) {
            config.worker_threads_per_locality = Some(value);
        }
        if let Some(value) = parse_env("GRIDFLOW_PARTITION_SHAPE", parse_extents) {
            config.partition_shape = Some(value);
        }
        if let Some(value) = parse_env("GRIDFLOW_PLACEMENT", |s| s.parse::<Placement>().ok()) {
            config.placement = Some(value);
        }
        if let Some(value) = parse_env("GRIDFLOW_CHANNEL_RECEIVE_TIMEOUT_MS", |s| {
            s.parse::<u64>().ok().map(Duration::from_millis)
        }) {
            config.channel_receive_timeout = Some(value);
        }
        if let Some(value) = parse_env("GRIDFLOW_VALIDATE_FLOW_DIRECTION", parse_bool) {
            config.validate_flow_direction = Some(value);
        }
        if let Ok(value) = env::var("GRIDFLOW_LOG_LEVEL") {
            config.log_level = Some(value);
        }

        config
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|err| Error::Config(format!("{}: {}", path.as_ref().display(), err)))?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(contents).map_err(|err| Error::Config(err.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        fs::write(path.as_ref(), yaml)
            .map_err(|err| Error::Config(format!("{}: {}", path.as_ref().display(), err)))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|err| Error::Config(err.to_string()))
    }

    /// Merge with another configuration, with the other taking precedence.
    pub fn merge(&mut self, other: &Self) {
        if other.nr_localities.is_some() {
            self.nr_localities = other.nr_localities;
        }
        if other.worker_threads_per_locality.is_some() {
            self.worker_threads_per_locality = other.worker_threads_per_locality;
        }
        if other.partition_shape.is_some() {
            self.partition_shape.clone_from(&other.partition_shape);
        }
        if other.placement.is_some() {
            self.placement = other.placement;
        }
        if other.channel_receive_timeout.is_some() {
            self.channel_receive_timeout = other.channel_receive_timeout;
        }
        if other.validate_flow_direction.is_some() {
            self.validate_flow_direction = other.validate_flow_direction;
        }
        if other.log_level.is_some() {
            self.log_level.clone_from(&other.log_level);
        }
    }

    /// Defaults, overridden by the YAML file at `path` (if given), then
    /// by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.merge(&Self::from_yaml(path)?);
        }
        config.merge(&Self::from_env());
        Ok(config)
    }

    /// A copy with every key resolved to its effective value.
    pub fn resolved(&self) -> Self {
        Self {
            nr_localities: Some(self.nr_localities()),
            worker_threads_per_locality: Some(self.worker_threads_per_locality()),
            partition_shape: Some(self.partition_shape().extents().to_vec()),
            placement: Some(self.placement()),
            channel_receive_timeout: Some(self.channel_receive_timeout()),
            validate_flow_direction: Some(self.validate_flow_direction()),
            log_level: Some(self.log_level().to_string()),
        }
    }

    fn check(&self) -> Result<()> {
        if self.nr_localities == Some(0) {
            return Err(Error::Config("nr_localities must be positive".to_string()));
        }
        if self.worker_threads_per_locality == Some(0) {
            return Err(Error::Config(
                "worker_threads_per_locality must be positive".to_string(),
            ));
        }
        if let Some(extents) = &self.partition_shape {
            if extents.is_empty() || extents.contains(&0) {
                return Err(Error::Config(format!(
                    "invalid partition_shape {:?}",
                    extents
                )));
            }
        }
        Ok(())
    }

    /// The number of localities.
    pub fn nr_localities(&self) -> usize {
        self.nr_localities.unwrap_or(DEFAULT_NR_LOCALITIES)
    }

    /// The number of worker threads per locality.
    pub fn worker_threads_per_locality(&self) -> usize {
        self.worker_threads_per_locality
            .unwrap_or(DEFAULT_WORKER_THREADS)
    }

    /// The default partition shape. Its rank need not match the rank
    /// of the arrays it is applied to; see [`Config::partition_shape_for`].
    pub fn partition_shape(&self) -> Shape {
        match &self.partition_shape {
            Some(extents) => Shape::from(extents.clone()),
            None => Shape::from(vec![DEFAULT_PARTITION_EXTENT; 2]),
        }
    }

    /// The default partition shape for an array of the given rank:
    /// missing trailing extents repeat the last configured extent.
    pub fn partition_shape_for(&self, rank: usize) -> Shape {
        let configured = self.partition_shape();
        let extents = configured.extents();
        let last = extents
            .last()
            .copied()
            .unwrap_or(DEFAULT_PARTITION_EXTENT);
        Shape::from(
            (0..rank)
                .map(|d| extents.get(d).copied().unwrap_or(last))
                .collect::<Vec<_>>(),
        )
    }

    /// How partitions are assigned to localities.
    pub fn placement(&self) -> Placement {
        self.placement.unwrap_or_default()
    }

    /// The bound on every inter-partition channel wait.
    pub fn channel_receive_timeout(&self) -> Duration {
        self.channel_receive_timeout
            .unwrap_or(DEFAULT_CHANNEL_RECEIVE_TIMEOUT)
    }

    /// Whether routing operations validate their flow direction input.
    pub fn validate_flow_direction(&self) -> bool {
        self.validate_flow_direction.unwrap_or(true)
    }

    /// The default log level, used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn set_nr_localities(&mut self, value: usize) {
        self.nr_localities = Some(value.max(1));
    }

    pub fn set_worker_threads_per_locality(&mut self, value: usize) {
        self.worker_threads_per_locality = Some(value.max(1));
    }

    pub fn set_partition_shape(&mut self, value: impl Into<Shape>) {
        self.partition_shape = Some(value.into().extents().to_vec());
    }

    pub fn set_placement(&mut self, value: Placement) {
        self.placement = Some(value);
    }

    pub fn set_channel_receive_timeout(&mut self, value: Duration) {
        self.channel_receive_timeout = Some(value);
    }

    pub fn set_validate_flow_direction(&mut self, value: bool) {
        self.validate_flow_direction = Some(value);
    }

    pub fn set_log_level(&mut self, value: impl Into<String>) {
        self.log_level = Some(value.into());
    }
}

fn parse_env<T>(key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let value = env::var(key).ok()?;
    match parse(value.trim()) {
        Some(parsed) => Some(parsed),
        None => {
            tracing::error!("ignoring invalid value {:?} for {}", value, key);
            None
        }
    }
}

/// Parses extents written as `500x500`.
fn parse_extents(value: &str) -> Option<Vec<usize>> {
    let extents = value
        .split(['x', 'X', ','])
        .map(|s| s.trim().parse::<usize>().ok().filter(|&e| e > 0))
        .collect::<Option<Vec<_>>>()?;
    (!extents.is_empty()).then_some(extents)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.nr_localities(), 1);
        assert_eq!(config.worker_threads_per_locality(), 2);
        assert_eq!(config.partition_shape(), Shape::from(vec![256, 256]));
        assert_eq!(config.placement(), Placement::Blocked);
        assert_eq!(config.channel_receive_timeout(), Duration::from_secs(30));
        assert!(config.validate_flow_direction());
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_merge() {
        let mut base = Config::default();
        base.set_nr_localities(4);
        base.set_log_level("debug");

        let mut other = Config::default();
        other.set_nr_localities(2);
        other.set_validate_flow_direction(false);

        base.merge(&other);
        assert_eq!(base.nr_localities(), 2);
        assert!(!base.validate_flow_direction());
        assert_eq!(base.log_level(), "debug");
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.set_partition_shape(vec![10, 20]);
        config.set_channel_receive_timeout(Duration::from_millis(250));
        config.set_placement(Placement::RoundRobin);

        let yaml = config.to_yaml_string().unwrap();
        assert!(yaml.contains("channel_receive_timeout_ms: 250"));
        assert_eq!(Config::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_rejects_bad_values() {
        assert!(Config::from_yaml_str("nr_localities: 0\n").is_err());
        assert!(Config::from_yaml_str("partition_shape: [4, 0]\n").is_err());
        assert!(Config::from_yaml_str("no_such_key: 1\n").is_err());
    }

    #[test]
    fn test_partition_shape_for_rank() {
        let mut config = Config::default();
        config.set_partition_shape(vec![8, 4]);
        assert_eq!(config.partition_shape_for(1), Shape::from(vec![8]));
        assert_eq!(config.partition_shape_for(3), Shape::from(vec![8, 4, 4]));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_extents("500x500"), Some(vec![500, 500]));
        assert_eq!(parse_extents("7"), Some(vec![7]));
        assert_eq!(parse_extents("5x0"), None);
        assert_eq!(parse_extents("axb"), None);
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_resolved() {
        let resolved = Config::default().resolved();
        let yaml = resolved.to_yaml_string().unwrap();
        assert!(yaml.contains("nr_localities: 1"));
        assert!(yaml.contains("placement: blocked"));
    }
}
