use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

/// Initialize logging. `RUST_LOG` wins over `log_level`; `force_debug` wins over both.
pub fn init_logging_with_options(log_level: Option<&str>, force_debug: bool) -> Result<()> {
    let filter = build_filter(log_level, force_debug)?;
    let level = effective_level(log_level, force_debug);

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!("Logging initialized with level: {}", level);
    Ok(())
}

fn effective_level(log_level: Option<&str>, force_debug: bool) -> &str {
    if force_debug {
        "debug"
    } else {
        log_level.unwrap_or("info")
    }
}

fn build_filter(log_level: Option<&str>, force_debug: bool) -> Result<EnvFilter> {
    if !force_debug {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    let level = effective_level(log_level, force_debug);
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
}

/// Log the settings a field technician needs when reading the journal
pub fn log_startup_info(role: &str, config: &AppConfig) {
    let disc = &config.discoverability;
    info!("=== receiverd {} starting ===", role);
    info!("Discoverability timeout: {}s", disc.timeout_seconds);
    info!("Sweeper poll interval: {}s", disc.poll_interval_seconds);
    info!("External call timeout: {}s", disc.external_call_timeout_seconds);
    info!("Lock file: {}", disc.lock_path.display());
    info!("Activation marker: {}", disc.marker_path.display());
    info!("Bluetooth units: {:?}", config.services.bluetooth_units);
    info!("Bluetooth adapter: {} {}", config.bus.bluez_service, config.bus.adapter_path);

    if disc.lock_path.parent() != disc.marker_path.parent() {
        warn!("Lock file and activation marker live in different directories");
    }
}

/// Log shutdown information
pub fn log_shutdown_info(role: &str, graceful: bool, uptime_seconds: u64) {
    let uptime_hours = uptime_seconds / 3600;
    let uptime_minutes = (uptime_seconds % 3600) / 60;

    info!("=== receiverd {} shutting down ===", role);
    info!("Shutdown type: {}", if graceful { "Graceful" } else { "Forced" });
    info!("Total uptime: {}h {}m", uptime_hours, uptime_minutes);
}
