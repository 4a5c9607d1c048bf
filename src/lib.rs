pub mod bus;
pub mod config;
pub mod discoverable;
pub mod error;
pub mod logging;
pub mod services;
pub mod volume;
pub mod web;

pub mod state {
    use crate::{
        bus::SystemBus, config::AppConfig, discoverable::ActivationCoordinator,
        services::ServiceManager, volume::VolumeController,
    };
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct AppState {
        pub config: Arc<AppConfig>,
        pub activation: Arc<ActivationCoordinator>,
        pub bus: Arc<dyn SystemBus>,
        pub services: Arc<dyn ServiceManager>,
        pub volume: Arc<dyn VolumeController>,
        pub hostname: Arc<str>,
    }
}
