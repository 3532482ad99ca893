// Copyright 2025 Cowboy AI, LLC.

//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Hard ceiling on claim attempts; callers must never spin
pub const MAX_CLAIM_ATTEMPTS: u32 = 5;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON could not be parsed
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment variable held an unusable value
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// Reservation engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts before a contended claim fails with `Contention` (1..=5)
    pub max_attempts: u32,
    /// Base pause between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_backoff_ms: 5,
        }
    }
}

impl EngineConfig {
    /// Attempt budget clamped to `1..=MAX_CLAIM_ATTEMPTS`
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_CLAIM_ATTEMPTS)
    }

    /// Pause before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// NATS JetStream KV store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsStoreConfig {
    /// KV bucket holding registries
    pub bucket: String,
    /// History depth per key
    pub history: i64,
}

impl Default for NatsStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "gift-registries".to_string(),
            history: 5,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reservation engine settings
    pub engine: EngineConfig,
    /// Durable store settings
    pub nats: NatsStoreConfig,
}

impl RegistryConfig {
    /// Parse from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `REGISTRY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("REGISTRY_MAX_CLAIM_ATTEMPTS") {
            config.engine.max_attempts = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "REGISTRY_MAX_CLAIM_ATTEMPTS",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("REGISTRY_RETRY_BACKOFF_MS") {
            config.engine.retry_backoff_ms =
                value.parse().map_err(|_| ConfigError::InvalidEnv {
                    name: "REGISTRY_RETRY_BACKOFF_MS",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("REGISTRY_NATS_BUCKET") {
            config.nats.bucket = value;
        }
        Ok(config)
    }
}
