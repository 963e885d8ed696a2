// Copyright © 2026 Cascade Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", _0)]
    MissingRequired(String),

    #[error("Invalid configuration value: {}", _0)]
    InvalidValue(String),

    #[error("Configuration file error: {}", _0)]
    FileError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
    pub key_prefix: String,
    pub ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("CASCADE_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            pool_size: 50,
            key_prefix: "cascade:".to_string(),
            ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Maximum entries the local tier keeps per region.
    pub capacity: usize,
    /// Per-entry lifetime in the local tier; 0 disables expiry.
    pub ttl_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Regions known up front. Further regions may still be created on first
    /// request; this list only seeds `cache_names`.
    #[serde(default)]
    pub regions: Vec<String>,
}

impl CacheConfig {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: CacheConfig =
            toml::from_str(raw).map_err(|e| ConfigError::FileError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileError(e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.redis.url.is_empty() {
            return Err(ConfigError::MissingRequired("redis.url".to_string()));
        }
        if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(format!(
                "redis.url must be a redis:// or rediss:// URL, got '{}'",
                self.redis.url
            )));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "redis.pool_size must be at least 1".to_string(),
            ));
        }
        if self.memory.capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "memory.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
