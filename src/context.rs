use std::sync::Arc;

use crate::api::{HttpSyncApi, SyncApi};
use crate::config::{AppConfig, ConfigError};
use crate::core::SyncTracker;

/// Everything a network-calling component needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub api: Arc<dyn SyncApi>,
    pub tracker: SyncTracker,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl AppContext {
    pub fn new(config: AppConfig, api: Arc<dyn SyncApi>) -> Self {
        Self {
            config: Arc::new(config),
            api,
            tracker: SyncTracker::new(),
        }
    }

    /// Build a context talking HTTP to the configured backend.
    pub fn from_config(config: AppConfig) -> Result<Self, ContextError> {
        let token = config.api.resolve_token()?;
        let api = HttpSyncApi::new(&config.api, token)?;
        Ok(Self::new(config, Arc::new(api)))
    }
}
