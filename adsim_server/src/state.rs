use std::sync::Arc;

use adsim_core::oauth::rate_limiter::RateLimiter;
use adsim_core::{
    AdService, GrantEngine, InMemoryCredentialStore, InMemoryGrantStore, InMemoryRateLimiter, InMemoryResourceStore,
    ResourceRepository,
};

use crate::config::SimConfig;

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: GrantEngine,
    pub service: AdService,
    pub limiter: Option<Arc<dyn RateLimiter>>,
    pub linkedin_version: Arc<str>,
}

impl AppState {
    /// Wires the in-memory stores according to `config`.
    pub fn from_config(config: &SimConfig) -> Self {
        let engine = GrantEngine::with_policy(
            Arc::new(InMemoryCredentialStore::new(config.client_credentials())),
            Arc::new(InMemoryGrantStore::new()),
            config.expiry_policy(),
        );
        let service = AdService::new(ResourceRepository::new(Arc::new(InMemoryResourceStore::new())));
        let limiter = config
            .rate_limit_per_minute
            .map(|limit| Arc::new(InMemoryRateLimiter::per_minute(limit)) as Arc<dyn RateLimiter>);
        AppState {
            engine,
            service,
            limiter,
            linkedin_version: Arc::from(config.linkedin_version.as_str()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}
