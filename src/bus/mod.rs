pub mod proxy;

use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use zbus::{proxy::CacheProperties, Connection};

use crate::{config::BusConfig, error::BusError};
use proxy::{Adapter1Proxy, RemoteControlProxy};

/// Lowest volume shairport-sync accepts before mute
pub const AIRPLAY_VOLUME_MIN: f64 = -30.0;
/// Full AirPlay volume
pub const AIRPLAY_VOLUME_MAX: f64 = 0.0;
/// shairport-sync's mute value
pub const AIRPLAY_VOLUME_MUTE: f64 = -144.0;

/// Control calls issued over the host's system message bus
#[async_trait]
pub trait SystemBus: Send + Sync {
    /// Toggle Bluetooth discoverability on the adapter
    async fn set_discoverable(&self, discoverable: bool) -> Result<(), BusError>;

    /// Set the connected AirPlay client's volume
    async fn set_airplay_volume(&self, volume: f64) -> Result<(), BusError>;

    /// Name of the connected AirPlay client, if the receiver answers
    async fn client_name(&self) -> Option<String>;

    /// AirPlay player state, if the receiver answers
    async fn player_state(&self) -> Option<String>;
}

/// [`SystemBus`] backed by a zbus connection to the system bus.
///
/// The connection is opened on first use so the controller can start before
/// (or without) the bus daemon.
pub struct DbusSystemBus {
    config: BusConfig,
    call_timeout: Duration,
    connection: OnceCell<Connection>,
}

impl DbusSystemBus {
    pub fn new(config: BusConfig, call_timeout: Duration) -> Self {
        Self {
            config,
            call_timeout,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<&Connection, BusError> {
        self.connection
            .get_or_try_init(|| async { Connection::system().await.map_err(BusError::Connection) })
            .await
    }

    async fn adapter(&self) -> Result<Adapter1Proxy<'_>, BusError> {
        let call = "org.bluez.Adapter1";
        let connection = self.connection().await?;
        Adapter1Proxy::builder(connection)
            .destination(self.config.bluez_service.as_str())
            .and_then(|b| b.path(self.config.adapter_path.as_str()))
            .map_err(|source| BusError::Call { call, source })?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(|source| BusError::Call { call, source })
    }

    async fn remote_control(&self) -> Result<RemoteControlProxy<'_>, BusError> {
        let call = "org.gnome.ShairportSync.RemoteControl";
        let connection = self.connection().await?;
        RemoteControlProxy::builder(connection)
            .destination(self.config.shairport_service.as_str())
            .and_then(|b| b.path(self.config.shairport_path.as_str()))
            .map_err(|source| BusError::Call { call, source })?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(|source| BusError::Call { call, source })
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> Result<T, BusError>
    where
        F: Future<Output = zbus::Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(BusError::Call { call, source }),
            Err(_) => Err(BusError::Timeout {
                call,
                timeout: self.call_timeout,
            }),
        }
    }

    async fn query_string(&self, call: &'static str, property: Property) -> Option<String> {
        let result = async {
            let proxy = self.remote_control().await?;
            match property {
                Property::ClientName => self.bounded(call, proxy.client_name()).await,
                Property::PlayerState => self.bounded(call, proxy.player_state()).await,
            }
        }
        .await;

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Unable to get shairport-sync {}: {}", call, e);
                None
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Property {
    ClientName,
    PlayerState,
}

#[async_trait]
impl SystemBus for DbusSystemBus {
    async fn set_discoverable(&self, discoverable: bool) -> Result<(), BusError> {
        debug!("Setting bluetooth discoverable: {}", discoverable);
        let adapter = self.adapter().await?;
        self.bounded(
            "org.bluez.Adapter1.Discoverable",
            adapter.set_discoverable(discoverable),
        )
        .await
    }

    async fn set_airplay_volume(&self, volume: f64) -> Result<(), BusError> {
        debug!("Setting airplay client volume: {}", volume);
        let remote = self.remote_control().await?;
        self.bounded(
            "org.gnome.ShairportSync.RemoteControl.SetAirplayVolume",
            remote.set_airplay_volume(volume),
        )
        .await
    }

    async fn client_name(&self) -> Option<String> {
        self.query_string("ClientName", Property::ClientName).await
    }

    async fn player_state(&self) -> Option<String> {
        self.query_string("PlayerState", Property::PlayerState).await
    }
}

/// Map a mixer percentage onto shairport-sync's AirPlay volume scale
pub fn airplay_volume_for_pct(vol_pct: u8) -> f64 {
    if vol_pct == 0 {
        return AIRPLAY_VOLUME_MUTE;
    }
    let pct = f64::from(vol_pct.min(100)) / 100.0;
    AIRPLAY_VOLUME_MIN + (AIRPLAY_VOLUME_MAX - AIRPLAY_VOLUME_MIN) * pct
}
