//! Configuration module
//!
//! Reads/writes skill configuration from ~/.config/snips-sht31/config.toml

use crate::shared::Locale;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Skill configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site this instance answers for; intents from other sites are ignored
    pub site_id: String,
    /// Language of the spoken replies
    pub locale: Locale,
    pub mqtt: MqttConfig,
    pub sensor: SensorConfig,
    pub intents: IntentNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "default".to_string(),
            locale: Locale::default(),
            mqtt: MqttConfig::default(),
            sensor: SensorConfig::default(),
            intents: IntentNames::default(),
        }
    }
}

/// Broker the voice platform runs on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "snips-sht31".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C character device the sensor hangs off
    pub i2c_device: PathBuf,
    /// Reject readings whose CRC bytes don't match
    pub verify_checksum: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_device: PathBuf::from("/dev/i2c-1"),
            verify_checksum: false,
        }
    }
}

/// Intent names as published by the voice platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentNames {
    pub temperature: String,
    pub humidity: String,
}

impl Default for IntentNames {
    fn default() -> Self {
        Self {
            temperature: "checkTemperature".to_string(),
            humidity: "checkHumidity".to_string(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("snips-sht31").join("config.toml"))
    }

    /// Load config from `path` (or the default path), or return defaults if not found
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::path() {
                Some(p) => p,
                None => {
                    tracing::warn!("Could not determine config directory, using defaults");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Apply a `--site-id` given on the command line
    pub fn with_site_override(mut self, site_id: Option<String>) -> Self {
        if let Some(site_id) = site_id {
            tracing::info!("Site overridden on command line: {:?}", site_id);
            self.site_id = site_id;
        }
        self
    }

    /// MQTT topics to subscribe to, one per handled intent
    pub fn intent_topics(&self) -> [String; 2] {
        [
            format!("hermes/intent/{}", self.intents.temperature),
            format!("hermes/intent/{}", self.intents.humidity),
        ]
    }
}
