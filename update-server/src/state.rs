use crate::config::AppConfig;
use crate::services::release_store::ReleaseStore;

pub struct AppState {
    pub config: AppConfig,
    pub releases: ReleaseStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let releases = ReleaseStore::new(config.updates_dir.clone());
        Self { config, releases }
    }
}
