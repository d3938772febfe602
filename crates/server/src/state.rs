//! Application state shared across handlers.

use std::sync::Arc;

use skillmeat_client::TokenVerifier;
use skillmeat_core::AppConfig;
use skillmeat_core::settings::{IconPackStore, SettingsStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: SettingsStore,
    pub icon_packs: IconPackStore,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(config: &AppConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            settings: SettingsStore::new(&config.settings_path),
            icon_packs: IconPackStore::new(config.icon_packs_path()),
            verifier,
        }
    }
}
