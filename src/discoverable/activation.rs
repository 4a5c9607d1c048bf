use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};

use super::{clock::Clock, store::DiscoverabilityStore};
use crate::{
    bus::SystemBus,
    error::ActivationError,
    services::{restart_all, ServiceManager},
};

/// Makes the Bluetooth radio discoverable on request.
///
/// The whole restart-then-enable sequence runs under the store's exclusive
/// token, and the activation marker is written only once every step of it
/// has succeeded.
pub struct ActivationCoordinator {
    store: DiscoverabilityStore,
    bus: Arc<dyn SystemBus>,
    services: Arc<dyn ServiceManager>,
    clock: Arc<dyn Clock>,
    bluetooth_units: Vec<String>,
    settle_delay: Duration,
}

impl ActivationCoordinator {
    pub fn new(
        store: DiscoverabilityStore,
        bus: Arc<dyn SystemBus>,
        services: Arc<dyn ServiceManager>,
        clock: Arc<dyn Clock>,
        bluetooth_units: Vec<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            services,
            clock,
            bluetooth_units,
            settle_delay,
        }
    }

    pub fn store(&self) -> &DiscoverabilityStore {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn activate(&self) -> Result<(), ActivationError> {
        info!("Making bluetooth discoverable...");

        let _guard = match self.store.try_acquire_exclusive() {
            Ok(guard) => guard,
            Err(e) if e.is_contention() => {
                warn!("Another discoverability change is in flight, not waiting");
                return Err(ActivationError::Contended);
            }
            Err(e) => {
                error!("Could not take discoverability lock: {}", e);
                return Err(e.into());
            }
        };

        // Restarting first recovers units that stop accepting connections
        // after running for a day or so.
        if let Err(e) = restart_all(self.services.as_ref(), &self.bluetooth_units).await {
            error!("Bluetooth service restart failed: {}", e);
            return Err(e.into());
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if let Err(e) = self.bus.set_discoverable(true).await {
            error!("Unable to set bluetooth discoverable: {}", e);
            return Err(e.into());
        }

        if let Err(e) = self.store.write_activation_marker(self.clock.now()) {
            error!("Bluetooth is discoverable but the activation marker could not be written: {}", e);
            return Err(ActivationError::Store(e));
        }

        info!("Bluetooth is discoverable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        discoverable::clock::ManualClock,
        error::{BusError, ServiceError},
    };
    use async_trait::async_trait;
    use std::{
        sync::Mutex,
        time::{Duration, SystemTime},
    };
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeBus {
        fail: bool,
        calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl SystemBus for FakeBus {
        async fn set_discoverable(&self, discoverable: bool) -> Result<(), BusError> {
            self.calls.lock().unwrap().push(discoverable);
            if self.fail {
                return Err(BusError::Timeout {
                    call: "Discoverable",
                    timeout: Duration::from_secs(30),
                });
            }
            Ok(())
        }

        async fn set_airplay_volume(&self, _volume: f64) -> Result<(), BusError> {
            Ok(())
        }

        async fn client_name(&self) -> Option<String> {
            None
        }

        async fn player_state(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct FakeServices {
        fail: bool,
        restarted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServiceManager for FakeServices {
        async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
            self.restarted.lock().unwrap().push(unit.to_string());
            if self.fail {
                return Err(ServiceError::ExitStatus {
                    unit: unit.to_string(),
                    code: Some(1),
                    stderr: String::new(),
                });
            }
            Ok(())
        }
    }

    fn coordinator(
        dir: &TempDir,
        bus: Arc<FakeBus>,
        services: Arc<FakeServices>,
        clock: ManualClock,
    ) -> ActivationCoordinator {
        ActivationCoordinator::new(
            DiscoverabilityStore::new(dir.path().join("bt.lock"), dir.path().join("bt.marker")),
            bus,
            services,
            Arc::new(clock),
            vec!["bluetooth.service".to_string(), "bt-speaker.service".to_string()],
            Duration::ZERO,
        )
    }

    fn epoch() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[tokio::test]
    async fn test_successful_activation_writes_marker() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(FakeBus::default());
        let services = Arc::new(FakeServices::default());
        let clock = ManualClock::new(epoch());
        let coordinator = coordinator(&dir, bus.clone(), services.clone(), clock);

        coordinator.activate().await.unwrap();

        assert_eq!(
            *services.restarted.lock().unwrap(),
            vec!["bluetooth.service", "bt-speaker.service"]
        );
        assert_eq!(*bus.calls.lock().unwrap(), vec![true]);
        assert_eq!(
            coordinator.store().read_activation_marker_age(epoch()).unwrap(),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_bus_failure_leaves_no_marker() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(FakeBus {
            fail: true,
            ..Default::default()
        });
        let coordinator = coordinator(
            &dir,
            bus.clone(),
            Arc::new(FakeServices::default()),
            ManualClock::new(epoch()),
        );

        let result = coordinator.activate().await;

        assert!(matches!(result, Err(ActivationError::Bus(_))));
        assert!(!coordinator.store().activation_marker_exists().unwrap());
    }

    #[tokio::test]
    async fn test_restart_failure_skips_bus_and_marker() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(FakeBus::default());
        let services = Arc::new(FakeServices {
            fail: true,
            ..Default::default()
        });
        let coordinator = coordinator(&dir, bus.clone(), services.clone(), ManualClock::new(epoch()));

        let result = coordinator.activate().await;

        assert!(matches!(result, Err(ActivationError::ServiceRestart(_))));
        assert_eq!(services.restarted.lock().unwrap().len(), 1);
        assert!(bus.calls.lock().unwrap().is_empty());
        assert!(!coordinator.store().activation_marker_exists().unwrap());
    }

    #[tokio::test]
    async fn test_contention_returns_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(FakeBus::default());
        let services = Arc::new(FakeServices::default());
        let coordinator = coordinator(&dir, bus.clone(), services.clone(), ManualClock::new(epoch()));

        let _held = coordinator.store().try_acquire_exclusive().unwrap();
        let result = coordinator.activate().await;

        assert!(matches!(result, Err(ActivationError::Contended)));
        assert!(services.restarted.lock().unwrap().is_empty());
        assert!(bus.calls.lock().unwrap().is_empty());
        assert!(!coordinator.store().activation_marker_exists().unwrap());
    }

    #[tokio::test]
    async fn test_lock_released_after_activation() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            &dir,
            Arc::new(FakeBus {
                fail: true,
                ..Default::default()
            }),
            Arc::new(FakeServices::default()),
            ManualClock::new(epoch()),
        );

        let _ = coordinator.activate().await;
        assert!(coordinator.store().try_acquire_exclusive().is_ok());
    }
}
