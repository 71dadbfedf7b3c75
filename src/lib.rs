//! RadioIQ MFA - multi-factor authorization and tiered token issuance
//!
//! The admin plane of the RadioIQ image-analysis platform guards its
//! privileged operations with TOTP factors. This crate provides:
//!
//! - **TOTP engine**: secret generation, QR provisioning, code verification
//! - **Staged secrets**: enrollment secrets that must be proven before use
//! - **MFA gate**: axum middleware denying privileged routes until the
//!   primary administrator's factor is enabled
//! - **Token ledger**: per-identity credit balances with tiered grants
//! - **Grant ceremony**: two-step dual-secret flow for large credits
//! - **Device pairing**: single-active inference-device enrollment
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use radioiq_mfa::{app, config::ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() {
//!     radioiq_mfa::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build();
//!     let ctx = app::AppContextBuilder::new().with_config(config).build();
//!
//!     app::serve(ctx).await.unwrap();
//! }
//! ```

pub mod app;
pub mod attempts;
pub mod ceremony;
pub mod config;
pub mod device;
mod error;
pub mod gate;
pub mod identity;
pub mod ledger;
pub mod registry;
pub mod routes;
pub mod testing;
pub mod totp;

pub use app::{router, AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder};
pub use error::{MfaError, Result};
pub use ledger::Tier;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// Call early in main(), before building the app context.
///
/// # Environment Variables
///
/// - `RUST_LOG` - log filter (default `info`)
/// - `RADIOIQ_LOG_JSON` - emit JSON lines when `true`
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("RADIOIQ_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a [`Config`]'s logging section.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
