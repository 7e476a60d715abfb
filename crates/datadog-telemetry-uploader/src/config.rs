// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use datadog_telemetry_store::{ProcessIdentifier, StorageMechanism, StoreOptions, DEFAULT_FILE_NAME};

use crate::error::ConfigError;
use crate::logs::LogBatchLimits;
use crate::upload::{
    CacheOptions, ExponentialBackoff, MetadataOptions, RedundancyOptions, UploadEndpoints,
    UploadOptions,
};

const DEFAULT_ENDPOINT: &str = "https://mobile-intake.datadoghq.com";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration of the telemetry pipeline
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directory holding the store file
    pub storage_dir: PathBuf,
    /// Store file name
    pub storage_file: String,
    /// When set, an in-memory store with this name is used instead of a file
    pub in_memory_name: Option<String>,
    /// Maximum pending uploads kept on disk, 0 for no limit
    pub cache_limit: usize,
    pub max_logs_per_batch: usize,
    pub max_batch_age: Duration,
    /// Immediate retries within one send
    pub automatic_retry_count: u32,
    /// Attempts after which a cached payload is dropped, 0 for never
    pub maximum_amount_of_retries: u32,
    pub retry_on_internet_connected: bool,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Base URL of the collector
    pub endpoint: String,
    pub api_key: Option<String>,
    pub device_id: String,
    pub user_agent: String,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".dd-telemetry"),
            storage_file: DEFAULT_FILE_NAME.to_string(),
            in_memory_name: None,
            cache_limit: CacheOptions::default().cache_limit,
            max_logs_per_batch: LogBatchLimits::default().max_logs_per_batch,
            max_batch_age: LogBatchLimits::default().max_batch_age,
            automatic_retry_count: 3,
            maximum_amount_of_retries: 20,
            retry_on_internet_connected: true,
            backoff_base: ExponentialBackoff::default().base,
            backoff_max: ExponentialBackoff::default().max,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            device_id: String::new(),
            user_agent: format!("dd-telemetry/{}", env!("CARGO_PKG_VERSION")),
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|value| !matches!(value.trim().to_lowercase().as_str(), "false" | "0" | "no"))
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            storage_dir: env::var("DD_TELEMETRY_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            storage_file: env::var("DD_TELEMETRY_STORAGE_FILE").unwrap_or(defaults.storage_file),
            in_memory_name: env::var("DD_TELEMETRY_IN_MEMORY").ok(),
            cache_limit: parse_env("DD_TELEMETRY_CACHE_LIMIT").unwrap_or(defaults.cache_limit),
            max_logs_per_batch: parse_env("DD_TELEMETRY_MAX_LOGS_PER_BATCH")
                .unwrap_or(defaults.max_logs_per_batch),
            max_batch_age: parse_env("DD_TELEMETRY_MAX_BATCH_AGE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_batch_age),
            automatic_retry_count: parse_env("DD_TELEMETRY_AUTOMATIC_RETRY_COUNT")
                .unwrap_or(defaults.automatic_retry_count),
            maximum_amount_of_retries: parse_env("DD_TELEMETRY_MAX_RETRIES")
                .unwrap_or(defaults.maximum_amount_of_retries),
            retry_on_internet_connected: parse_bool_env("DD_TELEMETRY_RETRY_ON_CONNECTED")
                .unwrap_or(defaults.retry_on_internet_connected),
            backoff_base: parse_env("DD_TELEMETRY_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: parse_env("DD_TELEMETRY_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
            endpoint: env::var("DD_TELEMETRY_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: env::var("DD_API_KEY").ok(),
            device_id: env::var("DD_TELEMETRY_DEVICE_ID").unwrap_or(defaults.device_id),
            user_agent: env::var("DD_TELEMETRY_USER_AGENT").unwrap_or(defaults.user_agent),
            log_level: env::var("DD_LOG_LEVEL")
                .map(|value| value.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.in_memory_name.is_none() && self.storage_file.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "DD_TELEMETRY_STORAGE_FILE cannot be empty".to_string(),
            ));
        }
        if matches!(&self.in_memory_name, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "DD_TELEMETRY_IN_MEMORY cannot be empty".to_string(),
            ));
        }
        if self.max_logs_per_batch == 0 {
            return Err(ConfigError::InvalidConfig(
                "max logs per batch must be greater than 0".to_string(),
            ));
        }
        if self.max_batch_age.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "max batch age must be greater than 0".to_string(),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::InvalidConfig(format!(
                "backoff base ({:?}) cannot exceed backoff max ({:?})",
                self.backoff_base, self.backoff_max
            )));
        }
        let endpoint = self.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid endpoint '{}'. Must be an http(s) URL",
                self.endpoint
            )));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn storage(&self) -> StorageMechanism {
        match &self.in_memory_name {
            Some(name) => StorageMechanism::in_memory(name.clone()),
            None => StorageMechanism::on_disk(self.storage_dir.clone(), self.storage_file.clone()),
        }
    }

    pub fn store_options(&self, process_id: ProcessIdentifier) -> StoreOptions {
        StoreOptions::new(self.storage(), process_id)
    }

    pub fn batch_limits(&self) -> LogBatchLimits {
        LogBatchLimits {
            max_logs_per_batch: self.max_logs_per_batch,
            max_batch_age: self.max_batch_age,
        }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            endpoints: UploadEndpoints::from_base_url(&self.endpoint),
            metadata: MetadataOptions {
                api_key: self.api_key.clone().unwrap_or_default(),
                device_id: self.device_id.clone(),
                user_agent: self.user_agent.clone(),
            },
            cache: CacheOptions {
                cache_limit: self.cache_limit,
            },
            redundancy: RedundancyOptions {
                automatic_retry_count: self.automatic_retry_count,
                maximum_amount_of_retries: self.maximum_amount_of_retries,
                retry_on_internet_connected: self.retry_on_internet_connected,
                backoff: Arc::new(ExponentialBackoff::new(self.backoff_base, self.backoff_max)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 16] = [
        "DD_TELEMETRY_STORAGE_DIR",
        "DD_TELEMETRY_STORAGE_FILE",
        "DD_TELEMETRY_IN_MEMORY",
        "DD_TELEMETRY_CACHE_LIMIT",
        "DD_TELEMETRY_MAX_LOGS_PER_BATCH",
        "DD_TELEMETRY_MAX_BATCH_AGE_MS",
        "DD_TELEMETRY_AUTOMATIC_RETRY_COUNT",
        "DD_TELEMETRY_MAX_RETRIES",
        "DD_TELEMETRY_RETRY_ON_CONNECTED",
        "DD_TELEMETRY_BACKOFF_BASE_MS",
        "DD_TELEMETRY_BACKOFF_MAX_MS",
        "DD_TELEMETRY_ENDPOINT",
        "DD_API_KEY",
        "DD_TELEMETRY_DEVICE_ID",
        "DD_TELEMETRY_USER_AGENT",
        "DD_LOG_LEVEL",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TelemetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let invalid = [
            TelemetryConfig {
                max_logs_per_batch: 0,
                ..Default::default()
            },
            TelemetryConfig {
                max_batch_age: Duration::ZERO,
                ..Default::default()
            },
            TelemetryConfig {
                storage_file: " ".to_string(),
                ..Default::default()
            },
            TelemetryConfig {
                endpoint: "collector.example.com".to_string(),
                ..Default::default()
            },
            TelemetryConfig {
                log_level: "verbose".to_string(),
                ..Default::default()
            },
            TelemetryConfig {
                backoff_base: Duration::from_secs(10),
                backoff_max: Duration::from_secs(1),
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        env::set_var("DD_TELEMETRY_IN_MEMORY", "env-test");
        env::set_var("DD_TELEMETRY_CACHE_LIMIT", "5");
        env::set_var("DD_TELEMETRY_MAX_BATCH_AGE_MS", "250");
        env::set_var("DD_TELEMETRY_RETRY_ON_CONNECTED", "false");
        env::set_var("DD_TELEMETRY_ENDPOINT", "http://localhost:8080");
        env::set_var("DD_API_KEY", "secret");
        env::set_var("DD_LOG_LEVEL", "DEBUG");

        let config = TelemetryConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.storage(), StorageMechanism::in_memory("env-test"));
        assert_eq!(config.cache_limit, 5);
        assert_eq!(config.batch_limits().max_batch_age, Duration::from_millis(250));
        assert!(!config.retry_on_internet_connected);
        assert_eq!(config.log_level, "debug");
        let options = config.upload_options();
        assert_eq!(options.metadata.api_key, "secret");
        assert_eq!(options.endpoints.logs, "http://localhost:8080/v2/logs");
        assert!(!options.redundancy.retry_on_internet_connected);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparsable_numbers() {
        clear_env();
        env::set_var("DD_TELEMETRY_MAX_LOGS_PER_BATCH", "lots");

        let config = TelemetryConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.max_logs_per_batch, 20);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_level() {
        clear_env();
        env::set_var("DD_LOG_LEVEL", "chatty");

        let result = TelemetryConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }
}
