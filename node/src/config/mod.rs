use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utilities::crypto::{Keypair, NodeKeypair};

//execution settings
pub const DEFAULT_STAMP_COST: u64 = 20;
pub const DEFAULT_START_ATTEMPTS: usize = 3;
pub const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COLLECT_POLL_ATTEMPTS: usize = 200;
pub const DEFAULT_COLLECT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_RESULT_CHANNEL_CAPACITY: usize = 1024;

//consensus settings
pub const DEFAULT_REQUIRED_CONSENSUS: f64 = 0.66;
pub const DEFAULT_CONSENSUS_TIMEOUT_MS: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub node: NodeConfiguration,
    pub execution: ExecutionConfiguration,
    pub consensus: ConsensusConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfiguration {
    /// Base58 encoded ed25519 keypair
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfiguration {
    /// Number of pool workers, independent of `parallelism`.
    pub workers: usize,
    /// Number of sub-block slots per block. Batch `i` becomes sub-block `i % parallelism`.
    pub parallelism: usize,
    #[serde(default = "default_stamp_cost")]
    pub stamp_cost: u64,
    #[serde(default = "default_start_attempts")]
    pub start_attempts: usize,
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_collect_poll_attempts")]
    pub collect_poll_attempts: usize,
    #[serde(default = "default_collect_poll_interval_ms")]
    pub collect_poll_interval_ms: u64,
    #[serde(default = "default_result_channel_capacity")]
    pub result_channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfiguration {
    /// Fraction of contacts that must propose the same result.
    #[serde(default = "default_required_consensus")]
    pub required_consensus: f64,
    /// Lower fraction accepted only when the required one isn't reached before the timeout.
    /// Deliberately has no default.
    pub adequate_consensus: f64,
    #[serde(default = "default_consensus_timeout_ms")]
    pub timeout_ms: u64,
}

impl Configuration {
    pub fn try_load<I: Into<PathBuf>>(path: I) -> Result<Configuration> {
        let path = path.into();
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        let configuration: Configuration = config.try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn try_write<I: Into<PathBuf>>(&self, path: I) -> Result<()> {
        let config = toml::to_string(&self)?;

        let config = format!(
            "#This file is generated by the node and may be overwritten\n{config}",
        );

        let mut file = std::fs::File::create(path.into())?;
        file.write_all(config.as_bytes())?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.execution.validate()?;
        self.consensus.validate()?;
        self.keypair()?;
        Ok(())
    }

    pub fn keypair(&self) -> Result<Keypair> {
        Keypair::from_base58(&self.node.private_key)
            .map_err(|err| ConfigurationError::Invalid(format!("node.private_key: {err}")))
    }
}

impl ExecutionConfiguration {
    pub fn new(workers: usize, parallelism: usize) -> Self {
        Self {
            workers,
            parallelism,
            stamp_cost: DEFAULT_STAMP_COST,
            start_attempts: DEFAULT_START_ATTEMPTS,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            collect_poll_attempts: DEFAULT_COLLECT_POLL_ATTEMPTS,
            collect_poll_interval_ms: DEFAULT_COLLECT_POLL_INTERVAL_MS,
            result_channel_capacity: DEFAULT_RESULT_CHANNEL_CAPACITY,
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn collect_poll_interval(&self) -> Duration {
        Duration::from_millis(self.collect_poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            (self.workers, "execution.workers"),
            (self.parallelism, "execution.parallelism"),
            (self.start_attempts, "execution.start_attempts"),
            (self.collect_poll_attempts, "execution.collect_poll_attempts"),
            (self.result_channel_capacity, "execution.result_channel_capacity"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigurationError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.stamp_cost == 0 {
            return Err(ConfigurationError::Invalid(
                "execution.stamp_cost must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl ConsensusConfiguration {
    pub fn new(required_consensus: f64, adequate_consensus: f64, timeout_ms: u64) -> Self {
        Self {
            required_consensus,
            adequate_consensus,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        let in_range = |v: f64| v > 0.0 && v <= 1.0;
        if !in_range(self.required_consensus) || !in_range(self.adequate_consensus) {
            return Err(ConfigurationError::Invalid(
                "consensus thresholds must be in (0, 1]".to_string(),
            ));
        }
        if self.adequate_consensus > self.required_consensus {
            return Err(ConfigurationError::Invalid(format!(
                "consensus.adequate_consensus {} exceeds consensus.required_consensus {}",
                self.adequate_consensus, self.required_consensus
            )));
        }
        Ok(())
    }
}

fn default_stamp_cost() -> u64 {
    DEFAULT_STAMP_COST
}

fn default_start_attempts() -> usize {
    DEFAULT_START_ATTEMPTS
}

fn default_start_timeout_ms() -> u64 {
    DEFAULT_START_TIMEOUT_MS
}

fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

fn default_collect_poll_attempts() -> usize {
    DEFAULT_COLLECT_POLL_ATTEMPTS
}

fn default_collect_poll_interval_ms() -> u64 {
    DEFAULT_COLLECT_POLL_INTERVAL_MS
}

fn default_result_channel_capacity() -> usize {
    DEFAULT_RESULT_CHANNEL_CAPACITY
}

fn default_required_consensus() -> f64 {
    DEFAULT_REQUIRED_CONSENSUS
}

fn default_consensus_timeout_ms() -> u64 {
    DEFAULT_CONSENSUS_TIMEOUT_MS
}
