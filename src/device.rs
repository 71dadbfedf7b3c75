//! Inference-device pairing.
//!
//! At most one inference device may be paired at a time. Pairing follows the
//! same stage-then-prove shape as factor enrollment: a QR is generated for
//! the device, the staged secret stays replayable across failed codes, and a
//! valid code promotes it to an enabled device record. The single-device
//! invariant is enforced both when pairing begins and inside the store's
//! insert, so racing confirmations cannot enable two devices.

use crate::error::{MfaError, Result};
use crate::registry::{SecretRegistry, StagedSecret};
use crate::totp::{TotpEngine, TotpSetup};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A paired inference device.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
    /// Operator-assigned device number, the key used at pairing time.
    pub box_no: String,
    pub secret: String,
    pub enabled: bool,
}

/// Trait for device storage.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Whether any enabled device exists.
    async fn any_enabled(&self) -> Result<bool>;

    /// Insert an enabled device.
    ///
    /// The single-device invariant lives here: the existence check and the
    /// insert must share one critical section, and an enabled device already
    /// present is a conflict.
    async fn insert_enabled(&self, device: DeviceIdentity) -> Result<DeviceIdentity>;

    async fn find_by_box(&self, box_no: &str) -> Result<Option<DeviceIdentity>>;
}

/// In-memory device store.
#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceIdentity>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn any_enabled(&self) -> Result<bool> {
        let devices = self.devices.read().unwrap();
        Ok(devices.values().any(|d| d.enabled))
    }

    async fn insert_enabled(&self, device: DeviceIdentity) -> Result<DeviceIdentity> {
        let mut devices = self.devices.write().unwrap();
        if devices.values().any(|d| d.enabled) {
            return Err(MfaError::conflict("Payment MFA is already configured"));
        }
        devices.insert(device.box_no.clone(), device.clone());
        Ok(device)
    }

    async fn find_by_box(&self, box_no: &str) -> Result<Option<DeviceIdentity>> {
        let devices = self.devices.read().unwrap();
        Ok(devices.get(box_no).cloned())
    }
}

/// Orchestrates device pairing over a store and a device-scoped registry.
pub struct DeviceAuthority {
    totp: TotpEngine,
    registry: Arc<dyn SecretRegistry>,
    store: Arc<dyn DeviceStore>,
}

impl DeviceAuthority {
    pub fn new(
        totp: TotpEngine,
        registry: Arc<dyn SecretRegistry>,
        store: Arc<dyn DeviceStore>,
    ) -> Self {
        Self {
            totp,
            registry,
            store,
        }
    }

    /// Stage a secret for a device and return its provisioning material.
    ///
    /// Refused while any device is already paired. Calling again for the
    /// same device number replaces the staged secret.
    pub async fn begin_pairing(&self, name: &str, box_no: &str) -> Result<TotpSetup> {
        if self.store.any_enabled().await? {
            return Err(MfaError::conflict("Payment MFA is already configured"));
        }

        let setup = self.totp.generate_setup(box_no)?;
        self.registry
            .stage(
                box_no,
                StagedSecret {
                    secret: setup.secret.clone(),
                    label: name.to_string(),
                },
            )
            .await?;

        tracing::info!(
            target: "mfa.device",
            box_no = %box_no,
            "Device pairing initiated"
        );
        Ok(setup)
    }

    /// Confirm a staged pairing with a code from the device's authenticator.
    ///
    /// A wrong code leaves the staged secret in place for retry; a valid
    /// code consumes it and enables the device.
    pub async fn confirm_pairing(&self, box_no: &str, code: &str) -> Result<DeviceIdentity> {
        let staged = self
            .registry
            .peek(box_no)
            .await?
            .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;

        if !self.totp.verify(&staged.secret, code, box_no)? {
            return Err(MfaError::unauthorized("Invalid MFA token"));
        }

        // Another confirmation may have raced us past the peek.
        let staged = self
            .registry
            .consume(box_no)
            .await?
            .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;

        let device = self
            .store
            .insert_enabled(DeviceIdentity {
                id: Uuid::new_v4().to_string(),
                name: staged.label,
                box_no: box_no.to_string(),
                secret: staged.secret,
                enabled: true,
            })
            .await?;

        tracing::info!(
            target: "mfa.device",
            box_no = %box_no,
            device_id = %device.id,
            "Device paired"
        );
        Ok(device)
    }

    /// Whether any device is currently paired.
    pub async fn is_any_device_paired(&self) -> Result<bool> {
        self.store.any_enabled().await
    }
}
