//! Bluetooth discoverability lifecycle.
//!
//! The HTTP server and the sweeper coordinate only through
//! [`DiscoverabilityStore`]: an flock on the lock file serializes changes,
//! and the activation marker's mtime records when the radio was made
//! discoverable. Either side can crash or restart without stranding the other.

pub mod activation;
pub mod clock;
pub mod deactivation;
pub mod store;
pub mod sweeper;

use std::sync::Arc;

use crate::{
    bus::SystemBus,
    config::AppConfig,
    services::ServiceManager,
};

pub use activation::ActivationCoordinator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use deactivation::{DeactivationOutcome, DeactivationProcedure};
pub use store::{DiscoverabilityStore, LockGuard};
pub use sweeper::{SweepOutcome, Sweeper};

/// Build the activation coordinator from configuration
pub fn activation_coordinator(
    config: &AppConfig,
    bus: Arc<dyn SystemBus>,
    services: Arc<dyn ServiceManager>,
    clock: Arc<dyn Clock>,
) -> ActivationCoordinator {
    ActivationCoordinator::new(
        DiscoverabilityStore::from_config(&config.discoverability),
        bus,
        services,
        clock,
        config.services.bluetooth_units.clone(),
        config.discoverability.settle_delay(),
    )
}

/// Build the sweeper and its deactivation procedure from configuration
pub fn sweeper(config: &AppConfig, bus: Arc<dyn SystemBus>, clock: Arc<dyn Clock>) -> Sweeper {
    let procedure = DeactivationProcedure::new(
        DiscoverabilityStore::from_config(&config.discoverability),
        bus,
        clock,
        config.discoverability.timeout(),
    );
    Sweeper::new(Arc::new(procedure), config.discoverability.poll_interval())
}
