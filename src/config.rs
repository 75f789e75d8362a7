//! Configuration for entity delivery

use crate::compression::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{DeliveryError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables for body transmission and encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Copy-loop buffer size in bytes (default: 64KB)
    /// Valid range: 512 bytes to 16MB
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// gzip/deflate level for on-the-fly compression (default: 6)
    /// Valid range: 0 to 9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Deadline for sending one response body, in milliseconds (default: none)
    #[serde(default)]
    pub transmit_timeout_ms: Option<u64>,

    /// Files at least this large are sent from a memory map (default: 64KB)
    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold: u64,

    /// Attempts made when opening an entity file (default: 3)
    #[serde(default = "default_file_open_retries")]
    pub file_open_retries: usize,

    /// Delay between file open attempts, in milliseconds (default: 50)
    #[serde(default = "default_file_open_retry_delay_ms")]
    pub file_open_retry_delay_ms: u64,
}

fn default_buffer_size() -> usize {
    64 * 1024 // 64KB
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_mmap_threshold() -> u64 {
    64 * 1024 // 64KB
}

fn default_file_open_retries() -> usize {
    3
}

fn default_file_open_retry_delay_ms() -> u64 {
    50
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            buffer_size: default_buffer_size(),
            compression_level: default_compression_level(),
            transmit_timeout_ms: None,
            mmap_threshold: default_mmap_threshold(),
            file_open_retries: default_file_open_retries(),
            file_open_retry_delay_ms: default_file_open_retry_delay_ms(),
        }
    }
}

impl DeliveryConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(DeliveryConfig)` if loading and validation succeed
    /// * `Err(DeliveryError)` if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            DeliveryError::ConfigError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: DeliveryConfig = serde_yaml::from_str(content).map_err(|e| {
            DeliveryError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - buffer_size must be between 512 bytes and 16MB
    /// - compression_level must be at most 9
    /// - transmit_timeout_ms, when set, must be > 0
    /// - file_open_retries must be > 0
    pub fn validate(&self) -> Result<()> {
        const MIN_BUFFER_SIZE: usize = 512;
        const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024; // 16MB

        if self.buffer_size < MIN_BUFFER_SIZE || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(DeliveryError::ConfigError(format!(
                "buffer_size must be between {} bytes and {}MB, got {} bytes",
                MIN_BUFFER_SIZE,
                MAX_BUFFER_SIZE / (1024 * 1024),
                self.buffer_size
            )));
        }

        if self.compression_level > 9 {
            return Err(DeliveryError::ConfigError(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }

        if self.transmit_timeout_ms == Some(0) {
            return Err(DeliveryError::ConfigError(
                "transmit_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        if self.file_open_retries == 0 {
            return Err(DeliveryError::ConfigError(
                "file_open_retries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn transmit_timeout(&self) -> Option<Duration> {
        self.transmit_timeout_ms.map(Duration::from_millis)
    }

    pub fn file_open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.file_open_retry_delay_ms)
    }
}
