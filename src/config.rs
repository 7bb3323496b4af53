//! Persisted appliance settings.
//!
//! Stored as TOML at `<config dir>/hub-monitor/config.toml`. A missing file is
//! written out with defaults on first start so it can be edited in place.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::mqtt::config::MqttConfig;
use crate::ui::indicator::IndicatorConfig;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Seconds the Tx screen lingers after an unkey
    pub idle_timeout: u64,
    pub debug: bool,
    /// Demo units never clear `first_boot`
    pub demo: bool,
    pub first_boot: bool,
    pub welcome_secs: u64,
    /// Identity seed for the client id, defaults to the machine id
    pub device_id: Option<String>,
    /// Pause between driver cycles
    pub cycle_ms: u64,
    pub mqtt: MqttConfig,
    pub indicator: IndicatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout: 5,
            debug: false,
            demo: false,
            first_boot: true,
            welcome_secs: 30,
            device_id: None,
            cycle_ms: 200,
            mqtt: MqttConfig::default(),
            indicator: IndicatorConfig::default(),
        }
    }
}

impl Config {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn welcome_hold(&self) -> Duration {
        Duration::from_secs(self.welcome_secs)
    }

    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hub-monitor")
            .join("config.toml")
    }

    /// Loads the config, writing defaults first if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, writing defaults", path.display());
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config {}: {}", path.display(), e))?;
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create {}: {}", parent.display(), e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        fs::write(path, content)
            .map_err(|e| eyre!("Failed to write config {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Stable broker client id derived from the device identity.
    pub fn client_id(&self) -> String {
        let seed = self
            .device_id
            .clone()
            .or_else(|| read_trimmed("/etc/machine-id"))
            .or_else(|| read_trimmed("/etc/hostname"))
            .unwrap_or_else(|| "unknown".to_string());
        client_id_from_seed(&seed)
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `hub_mon_<hex>`; seeds that are already hex are used as is.
pub fn client_id_from_seed(seed: &str) -> String {
    let hex = if seed.chars().all(|c| c.is_ascii_hexdigit()) {
        seed.to_ascii_lowercase()
    } else {
        seed.bytes().map(|b| format!("{:02x}", b)).collect()
    };
    // MQTT 3.1 brokers may reject ids over 23 bytes
    let hex: String = hex.chars().take(15).collect();
    format!("hub_mon_{}", hex)
}
