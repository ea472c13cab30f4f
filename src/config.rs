//! Configuration system for the ledsync agent
//!
//! Static device configuration loaded from a TOML file: broker endpoint,
//! the mirrored attribute key, timing, and pin assignments. Credentials
//! are referenced by environment variable name and resolved at runtime,
//! never stored in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Top-level agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub gpio: GpioSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device name used as the MQTT client id prefix
    pub name: String,
}

/// MQTT broker endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and port, e.g. `mqtt://thingsboard.cloud:1883`
    pub broker_url: String,
    /// Environment variable holding the device access token
    pub access_token_env: Option<String>,
}

/// Attribute synchronization parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSection {
    /// Name of the mirrored attribute
    #[serde(default = "default_attribute_key")]
    pub attribute_key: String,
    /// How long to wait for an attribute fetch response
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Cooperative polling period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            attribute_key: default_attribute_key(),
            request_timeout_ms: default_request_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Pin assignments (BCM numbering on the reference hardware)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpioSection {
    #[serde(default = "default_led_pin")]
    pub led_pin: u8,
    #[serde(default = "default_button_pin")]
    pub button_pin: u8,
}

impl Default for GpioSection {
    fn default() -> Self {
        Self {
            led_pin: default_led_pin(),
            button_pin: default_button_pin(),
        }
    }
}

fn default_attribute_key() -> String {
    "ledState".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_tick_interval_ms() -> u64 {
    200
}

fn default_led_pin() -> u8 {
    2
}

fn default_button_pin() -> u8 {
    0
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints that TOML parsing cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.name.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.name must not be empty".to_string(),
            ));
        }

        let url = Url::parse(&self.mqtt.broker_url).map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "mqtt.broker_url is not a valid URL: {}",
                self.mqtt.broker_url
            ))
        })?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.broker_url has no host".to_string(),
            ));
        }

        if self.sync.attribute_key.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "sync.attribute_key must not be empty".to_string(),
            ));
        }
        if self.sync.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync.request_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.sync.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "sync.tick_interval_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the device access token from the configured environment variable
    pub fn get_access_token(&self) -> Result<Option<String>, ConfigError> {
        match &self.mqtt.access_token_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    /// Fetch timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.request_timeout_ms)
    }

    /// Polling period as a [`Duration`]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.sync.tick_interval_ms)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
name = "test-device"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
