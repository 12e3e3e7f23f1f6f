//! Host configuration
//!
//! TOML configuration stored in the platform config directory.
//! Organized into sections:
//! - Device entries (alias, endpoint pattern, transport)
//! - Scheduler parameters
//! - Tracker aggregation parameters
//! - Optional proxy listener

use printhost_core::{Error, Result};
use printhost_transport::DEFAULT_BAUD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a configured device is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Local serial port
    Serial,
    /// Serial port on a remote host over ssh
    Ssh {
        host: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default = "default_ssh_port")]
        port: u16,
        /// Remote C compiler for the custom-baud helper
        #[serde(default)]
        compiler: Option<String>,
    },
    /// Serial port behind a printhost proxy server
    Proxy { addr: String },
}

fn default_ssh_port() -> u16 {
    22
}

/// One configured MCU connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Human-readable alias, e.g. "toolhead"
    pub alias: String,
    /// Endpoint pattern with optional baud suffix, e.g. "/dev/ttyACM*@250000"
    pub pattern: String,
    /// Transport used to reach the endpoint
    #[serde(default = "default_transport")]
    pub transport: Transport,
    /// Disabled entries are kept in the file but never opened
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_transport() -> Transport {
    Transport::Serial
}

fn default_true() -> bool {
    true
}

/// Command scheduling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Minimum spacing between slots of one actuator, in milliseconds
    pub min_spacing_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { min_spacing_ms: 100 }
    }
}

/// State aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Low-frequency publication period, in milliseconds
    pub low_freq_ms: u64,
    /// Minimum interval between change notifications per id, in milliseconds
    pub notify_min_ms: u64,
    /// Moving-average window, in milliseconds
    pub average_window_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            low_freq_ms: 5000,
            notify_min_ms: 500,
            average_window_ms: 5000,
        }
    }
}

/// Complete host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Configured MCU connections
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    /// Command scheduling
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// State aggregation
    #[serde(default)]
    pub tracker: TrackerSettings,
    /// Listen address for the embedded proxy server, e.g. "0.0.0.0:5001"
    #[serde(default)]
    pub proxy_listen: Option<String>,
}

impl Settings {
    /// Platform config file path, e.g. `~/.config/printhost/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::other("No config directory on this platform"))?;
        Ok(base.join("printhost").join("config.toml"))
    }

    /// Load from the default path, falling back to defaults if absent
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate a TOML config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate and save as TOML, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::other(format!("Failed to create config directory: {}", e)))?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.min_spacing_ms == 0 {
            return Err(Error::other("Scheduler min spacing must be > 0"));
        }
        if self.tracker.low_freq_ms == 0 {
            return Err(Error::other("Tracker publication period must be > 0"));
        }
        if self.tracker.average_window_ms == 0 {
            return Err(Error::other("Tracker average window must be > 0"));
        }
        for device in &self.devices {
            if device.alias.is_empty() {
                return Err(Error::other("Device alias must not be empty"));
            }
            if device.pattern.is_empty() {
                return Err(Error::other(format!(
                    "Device '{}' has an empty endpoint pattern",
                    device.alias
                )));
            }
            let duplicates = self
                .devices
                .iter()
                .filter(|d| d.alias == device.alias)
                .count();
            if duplicates > 1 {
                return Err(Error::other(format!(
                    "Duplicate device alias '{}'",
                    device.alias
                )));
            }
        }
        Ok(())
    }

    /// Baud rate configured for a device, from the pattern suffix
    pub fn baud_for(&self, alias: &str) -> u32 {
        self.devices
            .iter()
            .find(|d| d.alias == alias)
            .map(|d| {
                printhost_transport::Alias::parse(&d.alias, &d.pattern).baud
            })
            .unwrap_or(DEFAULT_BAUD)
    }

    /// Enabled device entries only
    pub fn enabled_devices(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.iter().filter(|d| d.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            devices: vec![
                DeviceEntry {
                    alias: "toolhead".to_string(),
                    pattern: "/dev/ttyACM*@115200".to_string(),
                    transport: Transport::Serial,
                    enabled: true,
                },
                DeviceEntry {
                    alias: "bedframe".to_string(),
                    pattern: "/dev/ttyUSB0".to_string(),
                    transport: Transport::Ssh {
                        host: "printer.local".to_string(),
                        user: Some("pi".to_string()),
                        port: 22,
                        compiler: Some("cc".to_string()),
                    },
                    enabled: false,
                },
            ],
            scheduler: SchedulerSettings { min_spacing_ms: 50 },
            tracker: TrackerSettings::default(),
            proxy_listen: Some("127.0.0.1:5001".to_string()),
        }
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = sample();
        settings.save_to_file(&path).unwrap();
        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let parsed: Settings = toml::from_str(
            r#"
            [[devices]]
            alias = "toolhead"
            pattern = "/dev/ttyACM0"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].transport, Transport::Serial);
        assert!(parsed.devices[0].enabled);
        assert_eq!(parsed.scheduler.min_spacing_ms, 100);
        assert_eq!(parsed.tracker.low_freq_ms, 5000);
        assert!(parsed.proxy_listen.is_none());
    }

    #[test]
    fn test_transport_tags() {
        let parsed: Settings = toml::from_str(
            r#"
            [[devices]]
            alias = "remote"
            pattern = "/dev/ttyS1@921600"
            transport = { type = "ssh", host = "printer.local" }

            [[devices]]
            alias = "proxied"
            pattern = "/dev/ttyACM*"
            transport = { type = "proxy", addr = "10.0.0.5:5001" }
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.devices[0].transport,
            Transport::Ssh {
                host: "printer.local".to_string(),
                user: None,
                port: 22,
                compiler: None,
            }
        );
        assert_eq!(
            parsed.devices[1].transport,
            Transport::Proxy {
                addr: "10.0.0.5:5001".to_string()
            }
        );
    }

    #[test]
    fn test_validation_rejects_duplicates() {
        let mut settings = sample();
        settings.devices[1].alias = "toolhead".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_spacing() {
        let mut settings = sample();
        settings.scheduler.min_spacing_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_baud_from_pattern() {
        let settings = sample();
        assert_eq!(settings.baud_for("toolhead"), 115200);
        assert_eq!(settings.baud_for("bedframe"), DEFAULT_BAUD);
        assert_eq!(settings.baud_for("missing"), DEFAULT_BAUD);
    }

    #[test]
    fn test_enabled_filter() {
        let settings = sample();
        let enabled: Vec<&str> = settings
            .enabled_devices()
            .map(|d| d.alias.as_str())
            .collect();
        assert_eq!(enabled, vec!["toolhead"]);
    }
}
