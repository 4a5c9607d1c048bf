use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{clock::Clock, store::DiscoverabilityStore};
use crate::{bus::SystemBus, error::StoreError};

/// What a deactivation attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationOutcome {
    /// No marker: the radio is already believed undiscoverable
    NoMarker,
    /// The marker exists but has not reached the timeout
    NotYetOverdue { age: Duration },
    /// Another discoverability change holds the lock; retry next sweep
    Contended,
    /// The marker was removed. `disabled` is whether the bus call succeeded.
    Deactivated { disabled: bool },
}

/// Revokes discoverability once the activation marker is overdue.
///
/// Safe to run speculatively: it rechecks the marker and its age before
/// touching the lock.
pub struct DeactivationProcedure {
    store: DiscoverabilityStore,
    bus: Arc<dyn SystemBus>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl DeactivationProcedure {
    pub fn new(
        store: DiscoverabilityStore,
        bus: Arc<dyn SystemBus>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            timeout,
        }
    }

    pub fn store(&self) -> &DiscoverabilityStore {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current marker age, for the sweeper's idle check
    pub fn marker_age(&self) -> Result<Option<Duration>, StoreError> {
        self.store.read_activation_marker_age(self.clock.now())
    }

    /// A marker is overdue once its age reaches the timeout
    pub fn is_overdue(&self, age: Duration) -> bool {
        age >= self.timeout
    }

    pub async fn run(&self) -> Result<DeactivationOutcome, StoreError> {
        let Some(age) = self.marker_age()? else {
            debug!("No activation marker: bluetooth must already be undiscoverable");
            return Ok(DeactivationOutcome::NoMarker);
        };

        if !self.is_overdue(age) {
            debug!(
                "Bluetooth has been discoverable for {:?}, under the {:?} timeout",
                age, self.timeout
            );
            return Ok(DeactivationOutcome::NotYetOverdue { age });
        }

        let _guard = match self.store.try_acquire_exclusive() {
            Ok(guard) => guard,
            Err(StoreError::WouldBlock) => {
                debug!("Discoverability lock is held, retrying on the next sweep");
                return Ok(DeactivationOutcome::Contended);
            }
            Err(e) => return Err(e),
        };

        // An activation may have refreshed or a peer may have removed the
        // marker between the age check and taking the lock.
        let age = match self.marker_age()? {
            None => return Ok(DeactivationOutcome::NoMarker),
            Some(age) if !self.is_overdue(age) => {
                return Ok(DeactivationOutcome::NotYetOverdue { age });
            }
            Some(age) => age,
        };

        info!(
            "Bluetooth has been discoverable for {:?} (timeout {:?}), making it undiscoverable...",
            age, self.timeout
        );

        let disabled = match self.bus.set_discoverable(false).await {
            Ok(()) => {
                info!("Sent bus command to make bluetooth undiscoverable");
                true
            }
            Err(e) => {
                // The marker goes regardless: an orphaned marker would be
                // retried every sweep forever.
                warn!(
                    "Unable to make bluetooth undiscoverable, removing the marker anyway: {}",
                    e
                );
                false
            }
        };

        self.store.remove_activation_marker()?;
        info!("Finished making bluetooth undiscoverable (bus call succeeded: {})", disabled);

        Ok(DeactivationOutcome::Deactivated { disabled })
    }
}
