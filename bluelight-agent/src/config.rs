use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::error::{AgentError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bluelight/bluelight.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub keys_path: String,
    pub input_timeout_ms: u64,
    pub bluetooth: BluetoothConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub service: String,
    pub adapter_path: String,
    pub call_timeout_ms: u64,
    pub pair_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            keys_path: "/etc/bluelight/keys".to_string(),
            input_timeout_ms: 1000,
            bluetooth: BluetoothConfig::default(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service: "org.bluez".to_string(),
            adapter_path: "/org/bluez/hci0".to_string(),
            call_timeout_ms: 25_000,
            pair_timeout_ms: 30_000,
        }
    }
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Create default config if not found
                let config = Self::default();
                if let Ok(content) = toml::to_string_pretty(&config) {
                    let _ = fs::write(path, content);
                }
                Ok(config)
            }
            Err(e) => Err(AgentError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AgentError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

impl BluetoothConfig {
    /// Object paths under this prefix are devices of the adapter.
    pub fn device_prefix(&self) -> String {
        format!("{}/", self.adapter_path.trim_end_matches('/'))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn pair_timeout(&self) -> Duration {
        Duration::from_millis(self.pair_timeout_ms)
    }

    /// Signals that announce devices appearing or disappearing.
    pub fn signal_match_rule(&self) -> String {
        format!(
            "type='signal',sender='{}',interface='{}'",
            self.service,
            crate::bus::OBJECT_MANAGER_INTERFACE
        )
    }
}
