//! Configuration for Ferry.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FERRY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ferry/config.toml
//!   3. ~/.config/ferry/config.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub transfer: TransferConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per chunk. The final chunk of a file may be shorter.
    pub chunk_size: usize,
    /// Retransmission attempts permitted per sequence number before it is
    /// marked permanently failed.
    pub max_retries: u32,
    /// Feedback cadence of the direct channel's scheduler, in milliseconds.
    pub feedback_interval_ms: u64,
    /// How long to await a scheduler's own shutdown before aborting it.
    pub scheduler_shutdown_timeout_ms: u64,
    /// Overall bound on waiting for delivery before a transfer is
    /// abandoned as stalled.
    pub completion_timeout_ms: u64,
    /// Per-chunk loss probability of the direct channel, in [0, 1].
    pub loss_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Partitions per topic. Messages are keyed by transfer id, so one
    /// transfer always lands on one partition.
    pub partitions: usize,
    /// Retries for a transiently failing record dispatch.
    pub consumer_max_retries: u32,
    /// Fixed delay between dispatch retries, in milliseconds.
    pub consumer_backoff_ms: u64,
}

impl TransferConfig {
    pub fn feedback_interval(&self) -> Duration {
        Duration::from_millis(self.feedback_interval_ms)
    }

    pub fn scheduler_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler_shutdown_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

impl BrokerConfig {
    pub fn consumer_backoff(&self) -> Duration {
        Duration::from_millis(self.consumer_backoff_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for FerryConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            max_retries: 5,
            feedback_interval_ms: 1_000,
            scheduler_shutdown_timeout_ms: 3_000,
            completion_timeout_ms: 300_000, // 5 minutes
            loss_probability: 0.0,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            consumer_max_retries: 3,
            consumer_backoff_ms: 500,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("ferry")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FerryConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            FerryConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FERRY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply FERRY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FERRY_TRANSFER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("FERRY_TRANSFER__MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.transfer.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("FERRY_TRANSFER__FEEDBACK_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.transfer.feedback_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("FERRY_TRANSFER__LOSS_PROBABILITY") {
            if let Ok(p) = v.parse() {
                self.transfer.loss_probability = p;
            }
        }
        if let Ok(v) = std::env::var("FERRY_BROKER__PARTITIONS") {
            if let Ok(n) = v.parse() {
                self.broker.partitions = n;
            }
        }
    }
}
