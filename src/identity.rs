//! Administrator identities and factor enrollment state.
//!
//! At most one identity is the primary administrator; gated operations load
//! it by role rather than by id. Each identity carries two independent TOTP
//! factors (sign-in and payment) plus one provisioned secret per grant tier.

use crate::error::{MfaError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// An administrator record.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Pre-hashed credential, opaque to this crate. Sign-in lives elsewhere.
    pub password_hash: String,
    pub is_primary: bool,
    /// Sign-in TOTP factor. `None` until enrollment completes.
    pub mfa_secret: Option<String>,
    pub mfa_enabled: bool,
    /// Payment TOTP factor, enrolled separately from the sign-in factor.
    pub payment_secret: Option<String>,
    pub payment_enabled: bool,
    /// One base32 secret per grant tier, provisioned at creation.
    pub tier_secrets: Vec<String>,
}

impl AdminIdentity {
    /// Secret provisioned for the given tier index.
    pub fn tier_secret(&self, index: usize) -> Option<&str> {
        self.tier_secrets.get(index).map(String::as_str)
    }
}

/// Input for creating an administrator.
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub tier_secrets: Vec<String>,
}

/// Trait for administrator storage.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// The primary administrator, if one has been created.
    async fn primary(&self) -> Result<Option<AdminIdentity>>;

    async fn find(&self, id: &str) -> Result<Option<AdminIdentity>>;

    /// Create the primary administrator.
    ///
    /// Fails with a conflict if a primary already exists; the uniqueness
    /// check and the insert happen under one critical section.
    async fn create_primary(&self, admin: NewAdmin) -> Result<AdminIdentity>;

    /// Record a verified sign-in factor and enable it.
    ///
    /// The factor is write-once: enabling over an already-enabled factor is
    /// a conflict. Re-enrollment requires `disable_mfa` first.
    async fn enable_mfa(&self, id: &str, secret: String) -> Result<AdminIdentity>;

    /// Clear the sign-in factor.
    async fn disable_mfa(&self, id: &str) -> Result<AdminIdentity>;

    /// Record a verified payment factor and enable it. Write-once, like the
    /// sign-in factor.
    async fn enable_payment_mfa(&self, id: &str, secret: String) -> Result<AdminIdentity>;
}

/// In-memory administrator store.
#[derive(Default)]
pub struct InMemoryAdminStore {
    admins: RwLock<HashMap<String, AdminIdentity>>,
}

impl InMemoryAdminStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<AdminIdentity>
    where
        F: FnOnce(&mut AdminIdentity) -> Result<()>,
    {
        let mut admins = self.admins.write().unwrap();
        let admin = admins
            .get_mut(id)
            .ok_or_else(|| MfaError::not_found("Admin not found"))?;
        apply(admin)?;
        Ok(admin.clone())
    }
}

#[async_trait]
impl AdminStore for InMemoryAdminStore {
    async fn primary(&self) -> Result<Option<AdminIdentity>> {
        let admins = self.admins.read().unwrap();
        Ok(admins.values().find(|a| a.is_primary).cloned())
    }

    async fn find(&self, id: &str) -> Result<Option<AdminIdentity>> {
        let admins = self.admins.read().unwrap();
        Ok(admins.get(id).cloned())
    }

    async fn create_primary(&self, admin: NewAdmin) -> Result<AdminIdentity> {
        let mut admins = self.admins.write().unwrap();
        if admins.values().any(|a| a.is_primary) {
            return Err(MfaError::conflict("Primary admin already exists"));
        }
        let identity = AdminIdentity {
            id: Uuid::new_v4().to_string(),
            name: admin.name,
            email: admin.email,
            password_hash: admin.password_hash,
            is_primary: true,
            mfa_secret: None,
            mfa_enabled: false,
            payment_secret: None,
            payment_enabled: false,
            tier_secrets: admin.tier_secrets,
        };
        admins.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn enable_mfa(&self, id: &str, secret: String) -> Result<AdminIdentity> {
        self.update(id, |admin| {
            if admin.mfa_enabled {
                return Err(MfaError::conflict("MFA is already enabled"));
            }
            admin.mfa_secret = Some(secret);
            admin.mfa_enabled = true;
            Ok(())
        })
    }

    async fn disable_mfa(&self, id: &str) -> Result<AdminIdentity> {
        self.update(id, |admin| {
            admin.mfa_secret = None;
            admin.mfa_enabled = false;
            Ok(())
        })
    }

    async fn enable_payment_mfa(&self, id: &str, secret: String) -> Result<AdminIdentity> {
        self.update(id, |admin| {
            if admin.payment_enabled {
                return Err(MfaError::conflict("Payment MFA is already enabled"));
            }
            admin.payment_secret = Some(secret);
            admin.payment_enabled = true;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_admin() -> NewAdmin {
        NewAdmin {
            name: "Primary".into(),
            email: "admin@example.com".into(),
            password_hash: "hash".into(),
            tier_secrets: vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()],
        }
    }

    #[tokio::test]
    async fn create_and_load_primary() {
        let store = InMemoryAdminStore::new();
        assert!(store.primary().await.unwrap().is_none());

        let created = store.create_primary(new_admin()).await.unwrap();
        assert!(created.is_primary);
        assert!(!created.mfa_enabled);

        let loaded = store.primary().await.unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.tier_secret(0), Some("A"));
        assert_eq!(loaded.tier_secret(4), Some("E"));
        assert_eq!(loaded.tier_secret(5), None);
    }

    #[tokio::test]
    async fn second_primary_is_a_conflict() {
        let store = InMemoryAdminStore::new();
        store.create_primary(new_admin()).await.unwrap();

        let err = store.create_primary(new_admin()).await.unwrap_err();
        assert!(matches!(err, MfaError::Conflict(_)));
    }

    #[tokio::test]
    async fn mfa_factor_is_write_once() {
        let store = InMemoryAdminStore::new();
        let admin = store.create_primary(new_admin()).await.unwrap();

        let updated = store
            .enable_mfa(&admin.id, "SECRET1".into())
            .await
            .unwrap();
        assert!(updated.mfa_enabled);
        assert_eq!(updated.mfa_secret.as_deref(), Some("SECRET1"));

        let err = store
            .enable_mfa(&admin.id, "SECRET2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Conflict(_)));

        // Disabling clears the factor and allows re-enrollment.
        let cleared = store.disable_mfa(&admin.id).await.unwrap();
        assert!(!cleared.mfa_enabled);
        assert!(cleared.mfa_secret.is_none());
        store.enable_mfa(&admin.id, "SECRET3".into()).await.unwrap();
    }

    #[tokio::test]
    async fn payment_factor_is_independent() {
        let store = InMemoryAdminStore::new();
        let admin = store.create_primary(new_admin()).await.unwrap();

        store
            .enable_payment_mfa(&admin.id, "PAY1".into())
            .await
            .unwrap();
        let loaded = store.find(&admin.id).await.unwrap().unwrap();
        assert!(loaded.payment_enabled);
        assert!(!loaded.mfa_enabled);

        let err = store
            .enable_payment_mfa(&admin.id, "PAY2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Conflict(_)));
    }

    #[tokio::test]
    async fn enabling_on_missing_admin_is_not_found() {
        let store = InMemoryAdminStore::new();
        let err = store.enable_mfa("nope", "S".into()).await.unwrap_err();
        assert!(matches!(err, MfaError::NotFound(_)));
    }
}
