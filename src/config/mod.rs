use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

pub mod validation;

use validation::ConfigValidator;

/// Location of the base configuration file on the appliance
pub const DEFAULT_CONFIG_PATH: &str = "/etc/receiverd/config.toml";

/// Main application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
    pub server: ServerConfig,
    pub discoverability: DiscoverabilityConfig,
    pub bus: BusConfig,
    pub services: ServicesConfig,
    pub volume: VolumeConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub interface: String,
    pub port: u16,
}

/// Bluetooth discoverability lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverabilityConfig {
    /// How long the radio stays discoverable before the sweeper revokes it
    pub timeout_seconds: u64,
    /// Sweeper poll cadence
    pub poll_interval_seconds: u64,
    /// Pause between restarting the Bluetooth units and enabling discoverability
    pub settle_delay_ms: u64,
    /// Upper bound on each service restart and bus call
    pub external_call_timeout_seconds: u64,
    pub lock_path: PathBuf,
    pub marker_path: PathBuf,
}

/// D-Bus destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub bluez_service: String,
    pub adapter_path: String,
    pub shairport_service: String,
    pub shairport_path: String,
}

/// systemd units the controller restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Prefix `systemctl` with `sudo -n`
    pub use_sudo: bool,
    /// Units mediating Bluetooth connectivity, restarted in order before enabling discoverability
    pub bluetooth_units: Vec<String>,
    /// AirPlay receiver unit, restarted when clients are disconnected
    pub airplay_unit: String,
}

/// ALSA mixer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub mixer_control: String,
    pub card: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            discoverability: DiscoverabilityConfig::default(),
            bus: BusConfig::default(),
            services: ServicesConfig::default(),
            volume: VolumeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DiscoverabilityConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            poll_interval_seconds: 5,
            settle_delay_ms: 1000,
            external_call_timeout_seconds: 30,
            lock_path: PathBuf::from("/tmp/receiverd_bt_discoverable.lock"),
            marker_path: PathBuf::from("/tmp/receiverd_bt_discoverable"),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bluez_service: "org.bluez".to_string(),
            adapter_path: "/org/bluez/hci0".to_string(),
            shairport_service: "org.gnome.ShairportSync".to_string(),
            shairport_path: "/org/gnome/ShairportSync".to_string(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            use_sudo: true,
            bluetooth_units: vec![
                "bluetooth.service".to_string(),
                "bt-speaker.service".to_string(),
            ],
            airplay_unit: "shairport-sync.service".to_string(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            mixer_control: "PCM".to_string(),
            card: None,
        }
    }
}

impl DiscoverabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_seconds)
    }
}

impl ServerConfig {
    /// Socket address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .interface
            .parse()
            .with_context(|| format!("Invalid server interface address: {}", self.interface))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl AppConfig {
    /// Load the base file (if present) and an optional override file on top of
    /// the built-in defaults, then validate the result.
    pub fn load_layered(base_path: &Path, overrides_path: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Value::try_from(Self::default())
            .context("Failed to serialize default configuration")?;

        if base_path.exists() {
            tracing::info!("Found config file at: {}", base_path.display());
            merge_values(&mut merged, read_toml(base_path)?);
        } else {
            tracing::info!(
                "No config file found at: {}, using built-in defaults",
                base_path.display()
            );
        }

        if let Some(path) = overrides_path {
            if !path.exists() {
                anyhow::bail!("Override config file does not exist: {}", path.display());
            }
            tracing::info!("Applying config overrides from: {}", path.display());
            merge_values(&mut merged, read_toml(path)?);
        }

        let config = merged
            .try_into::<AppConfig>()
            .context("Merged configuration does not match the expected layout")?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Render the configuration as commented TOML
    pub fn to_toml(&self) -> Result<String> {
        let base_toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        let mut content = String::from("# receiverd configuration\n\n");
        for line in base_toml.lines() {
            if line.starts_with("[discoverability]") {
                content.push_str("\n# Bluetooth discoverability window and state files\n");
            } else if line.starts_with("[bus]") {
                content.push_str("\n# D-Bus destinations for BlueZ and shairport-sync\n");
            } else if line.starts_with("[services]") {
                content.push_str("\n# systemd units restarted by the controller\n");
            }
            content.push_str(line);
            content.push('\n');
        }
        Ok(content)
    }
}

fn read_toml(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Overlay `overrides` onto `base`. Tables merge key by key; any other value,
/// including an empty table over a non-table, replaces what was there.
pub fn merge_values(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            for (key, value) in override_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        merge_values(existing, value);
                    }
                    _ => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
