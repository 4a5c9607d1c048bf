//! Fakes for the external collaborators, shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use receiverd::{
    bus::SystemBus,
    discoverable::{DiscoverabilityStore, ManualClock},
    error::{BusError, ServiceError, VolumeError},
    services::ServiceManager,
    volume::VolumeController,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};
use tempfile::TempDir;
use tokio::sync::Notify;

pub fn epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn temp_store() -> (TempDir, DiscoverabilityStore) {
    let dir = TempDir::new().unwrap();
    let store = DiscoverabilityStore::new(dir.path().join("bt.lock"), dir.path().join("bt.marker"));
    (dir, store)
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(epoch())
}

/// Records every bus call. Can fail discoverability calls, and can park a
/// call until released so a test can observe the lock being held.
#[derive(Default)]
pub struct FakeBus {
    pub fail_discoverable: AtomicBool,
    pub discoverable_calls: Mutex<Vec<bool>>,
    pub airplay_volumes: Mutex<Vec<f64>>,
    pub client_name: Mutex<Option<String>>,
    pub player_state: Mutex<Option<String>>,
    gate: Mutex<Option<Gate>>,
}

struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Handle for a parked bus call
pub struct GateHandle {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let bus = Self::default();
        bus.fail_discoverable.store(true, Ordering::SeqCst);
        Arc::new(bus)
    }

    /// Park the next discoverability call until `release` is notified
    pub fn gate_next_call(&self) -> GateHandle {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Gate {
            entered: entered.clone(),
            release: release.clone(),
        });
        GateHandle { entered, release }
    }

    pub fn discoverable_calls(&self) -> Vec<bool> {
        self.discoverable_calls.lock().unwrap().clone()
    }

    pub fn set_player(&self, client_name: Option<&str>, player_state: Option<&str>) {
        *self.client_name.lock().unwrap() = client_name.map(str::to_string);
        *self.player_state.lock().unwrap() = player_state.map(str::to_string);
    }
}

#[async_trait]
impl SystemBus for FakeBus {
    async fn set_discoverable(&self, discoverable: bool) -> Result<(), BusError> {
        self.discoverable_calls.lock().unwrap().push(discoverable);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.fail_discoverable.load(Ordering::SeqCst) {
            return Err(BusError::Timeout {
                call: "org.bluez.Adapter1.Discoverable",
                timeout: Duration::from_secs(30),
            });
        }
        Ok(())
    }

    async fn set_airplay_volume(&self, volume: f64) -> Result<(), BusError> {
        self.airplay_volumes.lock().unwrap().push(volume);
        Ok(())
    }

    async fn client_name(&self) -> Option<String> {
        self.client_name.lock().unwrap().clone()
    }

    async fn player_state(&self) -> Option<String> {
        self.player_state.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeServices {
    pub fail: AtomicBool,
    pub restarted: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let services = Self::default();
        services.fail.store(true, Ordering::SeqCst);
        Arc::new(services)
    }

    pub fn restarted(&self) -> Vec<String> {
        self.restarted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
        self.restarted.lock().unwrap().push(unit.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExitStatus {
                unit: unit.to_string(),
                code: Some(1),
                stderr: "Job failed".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeVolume {
    pub vol_pct: AtomicU8,
    pub fail: AtomicBool,
}

impl FakeVolume {
    pub fn new(vol_pct: u8) -> Arc<Self> {
        Arc::new(Self {
            vol_pct: AtomicU8::new(vol_pct),
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl VolumeController for FakeVolume {
    async fn get_vol_pct(&self) -> Result<u8, VolumeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VolumeError::Parse);
        }
        Ok(self.vol_pct.load(Ordering::SeqCst))
    }

    async fn set_vol_pct(&self, vol_pct: u8) -> Result<(), VolumeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VolumeError::ExitStatus {
                code: Some(1),
                stderr: "Unable to find simple control".to_string(),
            });
        }
        self.vol_pct.store(vol_pct, Ordering::SeqCst);
        Ok(())
    }
}
