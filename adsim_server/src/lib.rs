//! HTTP surface of the advertising platform simulator.
//!
//! Each platform is mounted under its own prefix (`/meta`, `/google-ads`,
//! `/linkedin`, `/tiktok`, `/ttd/v3`, `/dv360`) and speaks that platform's
//! wire dialect, while sharing one grant engine and one resource service.

pub mod config;
pub mod extract;
pub mod logging;
pub mod response;
pub mod routes;
pub mod state;

use axum::Router;

pub use config::{ConfigError, CredentialConfig, ExpiryConfig, SimConfig};
pub use state::AppState;

/// The complete router, ready to serve.
pub fn build_app(state: AppState) -> Router {
    routes::build_router(state)
}
