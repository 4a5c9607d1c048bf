//! D-Bus interface proxies for BlueZ and shairport-sync.

use zbus::{proxy, Result};

/// BlueZ adapter interface
///
/// Only the properties the controller touches are declared.
#[proxy(
    interface = "org.bluez.Adapter1",
    default_service = "org.bluez",
    default_path = "/org/bluez/hci0"
)]
pub trait Adapter1 {
    /// Whether the adapter is visible to scanning devices
    #[zbus(property)]
    fn discoverable(&self) -> Result<bool>;

    /// Make the adapter visible or invisible to scanning devices
    #[zbus(property)]
    fn set_discoverable(&self, discoverable: bool) -> Result<()>;
}

/// shairport-sync remote control interface
#[proxy(
    interface = "org.gnome.ShairportSync.RemoteControl",
    default_service = "org.gnome.ShairportSync",
    default_path = "/org/gnome/ShairportSync"
)]
pub trait RemoteControl {
    /// Set the connected AirPlay client's volume, in the range [-30.0, 0.0]
    /// with -144.0 meaning mute.
    fn set_airplay_volume(&self, volume: f64) -> Result<()>;

    /// Name of the connected AirPlay client
    #[zbus(property)]
    fn client_name(&self) -> Result<String>;

    /// "Playing", "Paused" or "Stopped"
    #[zbus(property)]
    fn player_state(&self) -> Result<String>;
}
