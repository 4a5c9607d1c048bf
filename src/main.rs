use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tracing::{error, info};

use receiverd::{
    bus::{DbusSystemBus, SystemBus},
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    discoverable::{self, Clock, DeactivationOutcome, SweepOutcome, SystemClock},
    logging,
    services::{ServiceManager, SystemctlServiceManager},
    state::AppState,
    volume::{AmixerVolumeController, VolumeController},
    web,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base configuration file; built-in defaults are used if it is absent
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override file merged on top of the base configuration
    #[arg(long, global = true)]
    overrides: Option<PathBuf>,

    /// Force debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP control API
    Serve {
        /// Also run the discoverability sweeper in this process
        #[arg(long)]
        with_sweeper: bool,
    },
    /// Run the discoverability sweeper
    Sweep,
    /// Revoke discoverability once if the activation marker is overdue
    Deactivate,
    /// Print the effective configuration
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_layered(&cli.config, cli.overrides.as_deref())
        .context("Failed to load configuration")?;

    if let Command::PrintConfig = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    logging::init_logging_with_options(Some(&config.log_level), cli.debug)?;

    let config = Arc::new(config);
    let call_timeout = config.discoverability.external_call_timeout();
    let bus: Arc<dyn SystemBus> = Arc::new(DbusSystemBus::new(config.bus.clone(), call_timeout));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Serve { with_sweeper } => serve(config, bus, clock, with_sweeper).await,
        Command::Sweep => sweep(config, bus, clock).await,
        Command::Deactivate => deactivate(config, bus, clock).await,
        Command::PrintConfig => Ok(()),
    }
}

async fn serve(
    config: Arc<AppConfig>,
    bus: Arc<dyn SystemBus>,
    clock: Arc<dyn Clock>,
    with_sweeper: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();
    logging::log_startup_info("server", &config);

    let call_timeout = config.discoverability.external_call_timeout();
    let services: Arc<dyn ServiceManager> = Arc::new(SystemctlServiceManager::new(
        config.services.use_sudo,
        call_timeout,
    ));
    let volume: Arc<dyn VolumeController> = Arc::new(AmixerVolumeController::new(
        config.volume.clone(),
        call_timeout,
    ));

    let activation = Arc::new(discoverable::activation_coordinator(
        &config,
        bus.clone(),
        services.clone(),
        clock.clone(),
    ));

    if with_sweeper {
        let sweeper = discoverable::sweeper(&config, bus.clone(), clock);
        tokio::spawn(sweeper.run());
    }

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let app_state = AppState {
        config: config.clone(),
        activation,
        bus,
        services,
        volume,
        hostname: Arc::from(hostname),
    };

    let app = web::create_router(app_state);

    let addr = config.server.bind_addr()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    logging::log_shutdown_info("server", true, started.elapsed().as_secs());
    Ok(())
}

async fn sweep(
    config: Arc<AppConfig>,
    bus: Arc<dyn SystemBus>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    logging::log_startup_info("sweeper", &config);

    let sweeper = discoverable::sweeper(&config, bus, clock);
    tokio::select! {
        _ = sweeper.run() => {}
        _ = shutdown_signal() => {}
    }

    logging::log_shutdown_info("sweeper", true, started.elapsed().as_secs());
    Ok(())
}

async fn deactivate(
    config: Arc<AppConfig>,
    bus: Arc<dyn SystemBus>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let sweeper = discoverable::sweeper(&config, bus, clock);
    match sweeper.sweep_once().await {
        SweepOutcome::Idle | SweepOutcome::Attempted(DeactivationOutcome::NoMarker) => {
            info!("Bluetooth is not discoverable, nothing to do");
        }
        SweepOutcome::Attempted(outcome) => info!("Deactivation outcome: {:?}", outcome),
        SweepOutcome::Failed => anyhow::bail!("Deactivation failed, see the log for details"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
