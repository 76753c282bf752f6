//! Configured client credentials and the static access token per platform.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::platform::Platform;

/// The one registered client of a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredential {
    pub platform: Platform,
    pub client_id: String,
    /// `None` means the platform accepts the client without a secret.
    pub client_secret: Option<String>,
    /// The single access token every protected request must present.
    pub static_access_token: String,
}

impl ClientCredential {
    /// Deterministic credentials used when no configuration is supplied.
    pub fn default_for(platform: Platform) -> Self {
        let name = platform.as_str();
        ClientCredential {
            platform,
            client_id: format!("{}-test-client", name),
            client_secret: Some(format!("{}-test-secret", name)),
            static_access_token: format!("{}-static-access-token", name),
        }
    }

    pub fn matches_client(&self, client_id: &str) -> bool {
        self.client_id == client_id
    }

    pub fn matches_secret(&self, presented: Option<&str>) -> bool {
        match &self.client_secret {
            Some(secret) => presented == Some(secret.as_str()),
            None => true,
        }
    }
}

/// Read access to configured credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the credential registered for the platform.
    async fn credential(&self, platform: Platform) -> Result<ClientCredential, ApiError>;
}

/// Credentials held in memory for the lifetime of the process.
#[derive(Clone)]
pub struct InMemoryCredentialStore {
    credentials: Arc<DashMap<Platform, ClientCredential>>,
}

impl InMemoryCredentialStore {
    /// Creates a store from an explicit list. Later entries for the same
    /// platform replace earlier ones.
    pub fn new(initial: Vec<ClientCredential>) -> Self {
        let map = DashMap::new();
        for credential in initial {
            map.insert(credential.platform, credential);
        }
        Self { credentials: Arc::new(map) }
    }

    /// Creates a store with [`ClientCredential::default_for`] every platform.
    pub fn with_defaults() -> Self {
        Self::new(Platform::ALL.into_iter().map(ClientCredential::default_for).collect())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credential(&self, platform: Platform) -> Result<ClientCredential, ApiError> {
        self.credentials
            .get(&platform)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ApiError::internal(format!("no credential configured for {}", platform)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_entries_win() {
        let mut custom = ClientCredential::default_for(Platform::Meta);
        custom.client_id = "custom".into();
        let store = InMemoryCredentialStore::new(vec![ClientCredential::default_for(Platform::Meta), custom]);
        assert_eq!(store.credential(Platform::Meta).await.unwrap().client_id, "custom");
        assert!(matches!(
            store.credential(Platform::TikTok).await,
            Err(ApiError::Internal { .. })
        ));
    }

    #[test]
    fn secretless_clients_accept_anything() {
        let mut credential = ClientCredential::default_for(Platform::TradeDesk);
        assert!(!credential.matches_secret(None));
        credential.client_secret = None;
        assert!(credential.matches_secret(None));
        assert!(credential.matches_secret(Some("whatever")));
    }
}
