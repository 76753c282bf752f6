//! OAuth2 grant engine: authorization codes, token exchange, refresh
//! rotation and bearer authentication.

pub mod engine;
pub mod memory;
pub mod provider;
pub mod rate_limiter;
pub mod types;
