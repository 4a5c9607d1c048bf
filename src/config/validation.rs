use anyhow::{anyhow, Context, Result};
use std::net::IpAddr;

use super::AppConfig;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_logging(config)?;
        Self::validate_server_config(config)?;
        Self::validate_discoverability_config(config)?;
        Self::validate_bus_config(config)?;
        Self::validate_services_config(config)?;
        Self::validate_volume_config(config)?;
        Ok(())
    }

    fn validate_logging(config: &AppConfig) -> Result<()> {
        if config.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        config
            .server
            .interface
            .parse::<IpAddr>()
            .with_context(|| {
                format!("Invalid server interface address: {}", config.server.interface)
            })?;

        Ok(())
    }

    /// Validate the discoverability window and state file layout
    fn validate_discoverability_config(config: &AppConfig) -> Result<()> {
        let disc = &config.discoverability;

        if disc.timeout_seconds == 0 {
            return Err(anyhow!("Discoverability timeout must be greater than 0 seconds"));
        }

        if disc.poll_interval_seconds == 0 {
            return Err(anyhow!("Sweeper poll interval must be greater than 0 seconds"));
        }

        if disc.external_call_timeout_seconds == 0 {
            return Err(anyhow!("External call timeout must be greater than 0 seconds"));
        }

        if disc.lock_path.as_os_str().is_empty() || disc.marker_path.as_os_str().is_empty() {
            return Err(anyhow!("Lock and marker paths must be set"));
        }

        // The marker's mtime is the activation timestamp; sharing a file with
        // the lock would let every acquisition refresh it.
        if disc.lock_path == disc.marker_path {
            return Err(anyhow!(
                "Lock path and marker path cannot be the same: {}",
                disc.lock_path.display()
            ));
        }

        if disc.poll_interval_seconds > disc.timeout_seconds {
            tracing::warn!(
                "Sweeper poll interval ({}s) is longer than the discoverability timeout ({}s)",
                disc.poll_interval_seconds,
                disc.timeout_seconds
            );
        }

        Ok(())
    }

    fn validate_bus_config(config: &AppConfig) -> Result<()> {
        let bus = &config.bus;
        for (name, value) in [
            ("bluez_service", &bus.bluez_service),
            ("shairport_service", &bus.shairport_service),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("bus.{} cannot be empty", name));
            }
        }

        for (name, value) in [
            ("adapter_path", &bus.adapter_path),
            ("shairport_path", &bus.shairport_path),
        ] {
            if !value.starts_with('/') {
                return Err(anyhow!("bus.{} must be an absolute object path: {}", name, value));
            }
        }

        Ok(())
    }

    fn validate_services_config(config: &AppConfig) -> Result<()> {
        for unit in config
            .services
            .bluetooth_units
            .iter()
            .chain(std::iter::once(&config.services.airplay_unit))
        {
            if unit.trim().is_empty() {
                return Err(anyhow!("Service unit names cannot be empty"));
            }
            if unit.chars().any(char::is_whitespace) {
                return Err(anyhow!("Service unit name contains whitespace: {:?}", unit));
            }
        }
        Ok(())
    }

    fn validate_volume_config(config: &AppConfig) -> Result<()> {
        if config.volume.mixer_control.trim().is_empty() {
            return Err(anyhow!("Mixer control name cannot be empty"));
        }
        Ok(())
    }
}
