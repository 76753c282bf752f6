//! Simulator configuration.
//!
//! Loaded from the TOML file named by `ADSIM_CONFIG` when it is set, falling
//! back to built-in defaults. `ADSIM_BIND` and `ADSIM_LOG` override the bind
//! address and log filter of whatever was loaded.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use adsim_core::platform::linkedin;
use adsim_core::{ClientCredential, ExpiryPolicy, Platform};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CONFIG_ENV: &str = "ADSIM_CONFIG";
pub const BIND_ENV: &str = "ADSIM_BIND";
pub const LOG_ENV: &str = "ADSIM_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid bind address {0}")]
    Bind(String),
    #[error("expiry.{field} = {value} is not a usable number of seconds")]
    Expiry { field: &'static str, value: i64 },
}

/// Credentials for one platform. Missing keys keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
}

/// Wall-clock limits on codes and refresh tokens, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub code_ttl_secs: Option<i64>,
    pub refresh_ttl_secs: Option<i64>,
}

impl ExpiryConfig {
    fn ttl(field: &'static str, secs: Option<i64>) -> Result<Option<chrono::Duration>, ConfigError> {
        match secs {
            None => Ok(None),
            Some(value) if value < 0 => Err(ConfigError::Expiry { field, value }),
            Some(value) => chrono::Duration::try_seconds(value)
                .map(Some)
                .ok_or(ConfigError::Expiry { field, value }),
        }
    }

    /// Both limits as durations, rejecting negative or unrepresentable
    /// values.
    pub fn policy(&self) -> Result<ExpiryPolicy, ConfigError> {
        Ok(ExpiryPolicy {
            code_ttl: Self::ttl("code_ttl_secs", self.code_ttl_secs)?,
            refresh_ttl: Self::ttl("refresh_ttl_secs", self.refresh_ttl_secs)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub bind: SocketAddr,
    pub log_filter: String,
    /// Value the `Linkedin-Version` header must carry.
    pub linkedin_version: String,
    /// Requests per minute per caller. Unset disables rate limiting.
    pub rate_limit_per_minute: Option<u32>,
    pub expiry: ExpiryConfig,
    pub credentials: BTreeMap<Platform, CredentialConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_filter: "info".to_string(),
            linkedin_version: linkedin::DEFAULT_VERSION.to_string(),
            rate_limit_per_minute: None,
            expiry: ExpiryConfig::default(),
            credentials: BTreeMap::new(),
        }
    }
}

impl SimConfig {
    /// Reads the file named by `ADSIM_CONFIG` (or the defaults) and applies
    /// the environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(raw)?;
        config.expiry.policy()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(bind) = std::env::var(BIND_ENV) {
            self.bind = bind.parse().map_err(|_| ConfigError::Bind(bind))?;
        }
        if let Ok(filter) = std::env::var(LOG_ENV) {
            self.log_filter = filter;
        }
        Ok(self)
    }

    pub fn bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn linkedin_version(mut self, version: impl Into<String>) -> Self {
        self.linkedin_version = version.into();
        self
    }

    pub fn rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = Some(limit);
        self
    }

    pub fn expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn credential(mut self, platform: Platform, credential: CredentialConfig) -> Self {
        self.credentials.insert(platform, credential);
        self
    }

    /// Effective credential for every platform.
    pub fn client_credentials(&self) -> Vec<ClientCredential> {
        Platform::ALL
            .into_iter()
            .map(|platform| {
                let mut credential = ClientCredential::default_for(platform);
                if let Some(configured) = self.credentials.get(&platform) {
                    if let Some(client_id) = &configured.client_id {
                        credential.client_id = client_id.clone();
                    }
                    if let Some(secret) = &configured.client_secret {
                        credential.client_secret = Some(secret.clone());
                    }
                    if let Some(token) = &configured.access_token {
                        credential.static_access_token = token.clone();
                    }
                }
                credential
            })
            .collect()
    }

    /// Effective expiry policy. Limits that do not fit a duration are left
    /// unset; `from_toml` has already refused them for file based configs.
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        self.expiry.policy().unwrap_or_else(|err| {
            warn!(error = %err, "ignoring unusable expiry limits");
            ExpiryPolicy::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        assert_eq!(SimConfig::from_toml("").unwrap(), SimConfig::default());
    }

    #[test]
    fn file_overrides_selected_credentials() {
        let config = SimConfig::from_toml(
            r#"
            bind = "0.0.0.0:9000"
            linkedin_version = "202406"
            rate_limit_per_minute = 60

            [expiry]
            code_ttl_secs = 600

            [credentials.meta]
            client_id = "1234567890"
            access_token = "EAAB-configured"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.linkedin_version, "202406");
        assert_eq!(config.rate_limit_per_minute, Some(60));
        assert_eq!(config.expiry_policy().code_ttl, Some(chrono::Duration::seconds(600)));
        assert!(config.expiry_policy().refresh_ttl.is_none());

        let credentials = config.client_credentials();
        let meta = credentials.iter().find(|c| c.platform == Platform::Meta).unwrap();
        assert_eq!(meta.client_id, "1234567890");
        assert_eq!(meta.client_secret.as_deref(), Some("meta-test-secret"));
        assert_eq!(meta.static_access_token, "EAAB-configured");
        let tiktok = credentials.iter().find(|c| c.platform == Platform::TikTok).unwrap();
        assert_eq!(*tiktok, ClientCredential::default_for(Platform::TikTok));
    }

    #[test]
    fn out_of_range_expiry_is_a_config_error() {
        let err = SimConfig::from_toml("[expiry]\ncode_ttl_secs = 9223372036854775807").unwrap_err();
        assert!(matches!(err, ConfigError::Expiry { field: "code_ttl_secs", .. }));
        let err = SimConfig::from_toml("[expiry]\nrefresh_ttl_secs = -5").unwrap_err();
        assert!(matches!(err, ConfigError::Expiry { field: "refresh_ttl_secs", value: -5 }));

        let config = SimConfig::default().expiry(ExpiryConfig { code_ttl_secs: Some(i64::MAX), refresh_ttl_secs: Some(60) });
        assert_eq!(config.expiry_policy(), ExpiryPolicy::default());
    }

    #[test]
    fn unknown_platforms_are_rejected() {
        assert!(SimConfig::from_toml("[credentials.myspace]\nclient_id = \"x\"").is_err());
    }
}
