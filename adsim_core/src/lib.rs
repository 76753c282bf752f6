//! Core of the advertising platform simulator.
//!
//! Holds everything with state or protocol logic: the OAuth2 grant engine,
//! per-platform validators and envelopes, the resource repository facade and
//! the stateless pagination codec. The HTTP surface lives in `adsim_server`.

pub mod credentials;
pub mod error;
pub mod oauth;
pub mod pagination;
pub mod platform;
pub mod resource;
pub mod service;
pub mod validation;

pub use credentials::{ClientCredential, CredentialStore, InMemoryCredentialStore};
pub use error::{ApiError, Constraint, ValidationError};
pub use oauth::engine::{ExpiryPolicy, GrantEngine};
pub use oauth::memory::{InMemoryGrantStore, InMemoryRateLimiter};
pub use oauth::types::{AuthorizeRequest, AuthorizeResponse, ClientContext, GrantType, IssuedToken, PresentedCredential, TokenRequest};
pub use pagination::{Cursor, Page, PageRequest};
pub use platform::{Platform, PlatformAdapter, PlatformProfile};
pub use resource::repository::ResourceRepository;
pub use resource::store::{InMemoryResourceStore, ResourceStore};
pub use resource::types::{Resource, ResourceType};
pub use service::AdService;
