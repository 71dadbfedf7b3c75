//! Application wiring.
//!
//! [`AppContext`] holds every shared service behind `Arc`s and is the axum
//! router state. [`AppContextBuilder`] assembles an all-in-memory context,
//! with hooks for swapping in other store implementations.

use crate::attempts::VerifyAttemptLimiter;
use crate::ceremony::GrantCeremonies;
use crate::config::Config;
use crate::device::{DeviceAuthority, DeviceStore, InMemoryDeviceStore};
use crate::error::Result;
use crate::gate::require_mfa;
use crate::identity::{AdminStore, InMemoryAdminStore};
use crate::ledger::{InMemoryTokenLedger, TokenLedger};
use crate::registry::{InMemorySecretRegistry, SecretRegistry};
use crate::routes;
use crate::totp::{TotpConfig, TotpEngine};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the whole service.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub totp: TotpEngine,
    pub admins: Arc<dyn AdminStore>,
    pub ledger: Arc<dyn TokenLedger>,
    pub devices: Arc<dyn DeviceStore>,
    /// Staged secrets for the sign-in factor, keyed by admin id.
    pub admin_registry: Arc<dyn SecretRegistry>,
    /// Staged secrets for the payment factor, keyed by admin id.
    pub payment_registry: Arc<dyn SecretRegistry>,
    /// Staged secrets for device pairing, keyed by device number.
    pub device_registry: Arc<dyn SecretRegistry>,
    pub ceremonies: Arc<GrantCeremonies>,
    pub device_authority: Arc<DeviceAuthority>,
    pub attempts: VerifyAttemptLimiter,
}

/// Builder wiring an [`AppContext`] from a [`Config`] and stores.
pub struct AppContextBuilder {
    config: Config,
    admins: Option<Arc<dyn AdminStore>>,
    ledger: Option<Arc<dyn TokenLedger>>,
    devices: Option<Arc<dyn DeviceStore>>,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            admins: None,
            ledger: None,
            devices: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_admin_store(mut self, admins: Arc<dyn AdminStore>) -> Self {
        self.admins = Some(admins);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn TokenLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_device_store(mut self, devices: Arc<dyn DeviceStore>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn build(self) -> AppContext {
        let config = self.config;
        let totp = TotpEngine::new(TotpConfig::new(config.mfa.issuer.clone()));
        let pending_ttl = Duration::from_secs(config.mfa.pending_secret_ttl_secs);
        let ceremony_ttl = Duration::from_secs(config.mfa.ceremony_ttl_secs);

        let admins = self
            .admins
            .unwrap_or_else(|| Arc::new(InMemoryAdminStore::new()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryTokenLedger::new()));
        let devices = self
            .devices
            .unwrap_or_else(|| Arc::new(InMemoryDeviceStore::new()));

        let admin_registry: Arc<dyn SecretRegistry> =
            Arc::new(InMemorySecretRegistry::new(pending_ttl));
        let payment_registry: Arc<dyn SecretRegistry> =
            Arc::new(InMemorySecretRegistry::new(pending_ttl));
        let device_registry: Arc<dyn SecretRegistry> =
            Arc::new(InMemorySecretRegistry::new(pending_ttl));

        let ceremonies = Arc::new(GrantCeremonies::new(
            totp.clone(),
            ledger.clone(),
            ceremony_ttl,
        ));
        let device_authority = Arc::new(DeviceAuthority::new(
            totp.clone(),
            device_registry.clone(),
            devices.clone(),
        ));
        let attempts = VerifyAttemptLimiter::new(config.mfa.attempt_limit());

        AppContext {
            config,
            totp,
            admins,
            ledger,
            devices,
            admin_registry,
            payment_registry,
            device_registry,
            ceremonies,
            device_authority,
            attempts,
        }
    }
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the full application router.
///
/// Enrollment and status endpoints are open; everything privileged sits
/// behind the MFA gate.
pub fn router(ctx: AppContext) -> Router {
    let admin = routes::admin::open_routes().merge(
        routes::admin::gated_routes()
            .layer(middleware::from_fn_with_state(ctx.clone(), require_mfa)),
    );
    let device = routes::device::open_routes().merge(
        routes::device::gated_routes()
            .layer(middleware::from_fn_with_state(ctx.clone(), require_mfa)),
    );

    Router::new()
        .nest("/admin", admin)
        .nest("/inference", device)
        .with_state(ctx)
}

/// Serve the router on the configured address until shutdown.
pub async fn serve(ctx: AppContext) -> Result<()> {
    let addr = ctx
        .config
        .server
        .addr()
        .map_err(|e| crate::error::MfaError::internal(format!("invalid listen address: {}", e)))?;
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    tracing::info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;
    Ok(())
}
