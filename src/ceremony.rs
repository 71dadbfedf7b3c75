//! Two-step credit-grant ceremony.
//!
//! Granting tier credits takes two proofs from two different secrets: first a
//! code from the administrator's payment factor, then a code from the secret
//! provisioned for the requested tier. The first proof opens a short-lived
//! window; the second proof closes it and credits the ledger. A window admits
//! exactly one grant, however many confirmations race for it.

use crate::error::{MfaError, Result};
use crate::identity::AdminIdentity;
use crate::ledger::{Tier, TokenLedger};
use crate::totp::TotpEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Default lifetime of a payment-verified window.
pub const DEFAULT_CEREMONY_TTL: Duration = Duration::from_secs(300);

/// Where an administrator currently stands in the ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyStage {
    /// No open window; the payment step must run (again).
    Idle,
    /// Payment step passed; a tier confirmation will be accepted until the
    /// window expires or is spent.
    PaymentVerified,
}

/// Tracks open payment-verified windows, keyed by administrator id.
pub struct GrantCeremonies {
    totp: TotpEngine,
    ledger: Arc<dyn TokenLedger>,
    ttl: Duration,
    windows: RwLock<HashMap<String, Instant>>,
}

impl GrantCeremonies {
    pub fn new(totp: TotpEngine, ledger: Arc<dyn TokenLedger>, ttl: Duration) -> Self {
        Self {
            totp,
            ledger,
            ttl,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// First step: prove possession of the payment factor.
    ///
    /// On success an existing window for the same administrator is replaced,
    /// not extended. A failed code leaves any open window untouched.
    pub async fn verify_payment_step(&self, admin: &AdminIdentity, code: &str) -> Result<()> {
        let secret = match (&admin.payment_secret, admin.payment_enabled) {
            (Some(secret), true) => secret.as_str(),
            _ => {
                return Err(MfaError::forbidden(
                    "Payment MFA is not enabled for this admin",
                ))
            }
        };

        if !self.totp.verify(secret, code, &admin.email)? {
            return Err(MfaError::unauthorized("Invalid payment token"));
        }

        let mut windows = self.windows.write().unwrap();
        windows.retain(|_, opened_at| opened_at.elapsed() < self.ttl);
        windows.insert(admin.id.clone(), Instant::now());

        tracing::info!(
            target: "mfa.ceremony",
            admin_id = %admin.id,
            "Payment step verified, grant window opened"
        );
        Ok(())
    }

    /// Second step: prove the tier secret and credit the ledger.
    ///
    /// Requires an unexpired window from [`verify_payment_step`]. A wrong
    /// code does not spend the window; a successful grant does, atomically,
    /// so concurrent confirmations produce at most one credit. Returns the
    /// new balance.
    pub async fn verify_tier_step_and_grant(
        &self,
        admin: &AdminIdentity,
        tier: Tier,
        code: &str,
    ) -> Result<u64> {
        if self.stage_of(&admin.id) != CeremonyStage::PaymentVerified {
            return Err(MfaError::forbidden("Payment verification step not completed"));
        }

        let secret = admin
            .tier_secret(tier.index())
            .ok_or_else(|| MfaError::internal("admin has no secret for this tier"))?;

        if !self.totp.verify(secret, code, &admin.email)? {
            return Err(MfaError::unauthorized("Invalid tier token"));
        }

        // Spend the window. Losing the race (or expiring between the check
        // above and here) reads as the window never having been open.
        let spent = {
            let mut windows = self.windows.write().unwrap();
            match windows.remove(&admin.id) {
                Some(opened_at) => opened_at.elapsed() < self.ttl,
                None => false,
            }
        };
        if !spent {
            return Err(MfaError::forbidden("Payment verification step not completed"));
        }

        let new_total = self.ledger.credit(&admin.id, tier.amount()).await?;
        tracing::info!(
            target: "mfa.ceremony",
            admin_id = %admin.id,
            tier = tier.number(),
            amount = tier.amount(),
            new_total,
            "Tier grant completed"
        );
        Ok(new_total)
    }

    /// Close any open window without granting.
    pub fn cancel(&self, admin_id: &str) {
        let mut windows = self.windows.write().unwrap();
        if windows.remove(admin_id).is_some() {
            tracing::info!(
                target: "mfa.ceremony",
                admin_id = %admin_id,
                "Grant window cancelled"
            );
        }
    }

    /// Current stage for an administrator. Expired windows read as idle.
    pub fn stage_of(&self, admin_id: &str) -> CeremonyStage {
        let windows = self.windows.read().unwrap();
        match windows.get(admin_id) {
            Some(opened_at) if opened_at.elapsed() < self.ttl => CeremonyStage::PaymentVerified,
            _ => CeremonyStage::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryTokenLedger;
    use crate::totp::{TotpConfig, TotpEngine};

    fn engine() -> TotpEngine {
        TotpEngine::new(TotpConfig::default())
    }

    fn admin_with_factors(totp: &TotpEngine) -> AdminIdentity {
        let payment = totp.generate_setup("admin@example.com").unwrap();
        let tiers: Vec<String> = (0..5)
            .map(|_| totp.generate_setup("admin@example.com").unwrap().secret)
            .collect();
        AdminIdentity {
            id: "admin-1".into(),
            name: "Primary".into(),
            email: "admin@example.com".into(),
            password_hash: "hash".into(),
            is_primary: true,
            mfa_secret: None,
            mfa_enabled: false,
            payment_secret: Some(payment.secret),
            payment_enabled: true,
            tier_secrets: tiers,
        }
    }

    fn ceremonies(totp: TotpEngine, ttl: Duration) -> (GrantCeremonies, Arc<InMemoryTokenLedger>) {
        let ledger = Arc::new(InMemoryTokenLedger::new());
        (
            GrantCeremonies::new(totp, ledger.clone(), ttl),
            ledger,
        )
    }

    fn payment_code(totp: &TotpEngine, admin: &AdminIdentity) -> String {
        totp.generate_current(admin.payment_secret.as_ref().unwrap(), &admin.email)
            .unwrap()
    }

    fn tier_code(totp: &TotpEngine, admin: &AdminIdentity, tier: Tier) -> String {
        totp.generate_current(admin.tier_secret(tier.index()).unwrap(), &admin.email)
            .unwrap()
    }

    #[tokio::test]
    async fn full_ceremony_credits_the_ledger() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, ledger) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let code = payment_code(&totp, &admin);
        ceremonies.verify_payment_step(&admin, &code).await.unwrap();
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::PaymentVerified);

        let code = tier_code(&totp, &admin, Tier::Two);
        let new_total = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::Two, &code)
            .await
            .unwrap();
        assert_eq!(new_total, 10_000);
        assert_eq!(ledger.balance(&admin.id).await.unwrap(), 10_000);
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::Idle);
    }

    #[tokio::test]
    async fn tier_step_without_payment_step_is_forbidden() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, ledger) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let code = tier_code(&totp, &admin, Tier::One);
        let err = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::One, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Forbidden(_)));
        assert_eq!(ledger.balance(&admin.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_payment_code_does_not_open_a_window() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, _) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let err = ceremonies
            .verify_payment_step(&admin, "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Unauthorized(_)));
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::Idle);
    }

    #[tokio::test]
    async fn wrong_tier_code_leaves_the_window_open() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, ledger) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let code = payment_code(&totp, &admin);
        ceremonies.verify_payment_step(&admin, &code).await.unwrap();

        let err = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::Three, "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Unauthorized(_)));
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::PaymentVerified);

        // Retry with the right code still works.
        let code = tier_code(&totp, &admin, Tier::Three);
        let new_total = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::Three, &code)
            .await
            .unwrap();
        assert_eq!(new_total, 20_000);
        assert_eq!(ledger.balance(&admin.id).await.unwrap(), 20_000);
    }

    #[tokio::test]
    async fn window_admits_exactly_one_grant() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, ledger) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let code = payment_code(&totp, &admin);
        ceremonies.verify_payment_step(&admin, &code).await.unwrap();

        let code = tier_code(&totp, &admin, Tier::One);
        ceremonies
            .verify_tier_step_and_grant(&admin, Tier::One, &code)
            .await
            .unwrap();

        // Replaying the confirmation finds no open window.
        let err = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::One, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Forbidden(_)));
        assert_eq!(ledger.balance(&admin.id).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn window_expires() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, ledger) = ceremonies(totp.clone(), Duration::from_millis(10));

        let code = payment_code(&totp, &admin);
        ceremonies.verify_payment_step(&admin, &code).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::Idle);

        let code = tier_code(&totp, &admin, Tier::Five);
        let err = ceremonies
            .verify_tier_step_and_grant(&admin, Tier::Five, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Forbidden(_)));
        assert_eq!(ledger.balance(&admin.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_closes_the_window() {
        let totp = engine();
        let admin = admin_with_factors(&totp);
        let (ceremonies, _) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let code = payment_code(&totp, &admin);
        ceremonies.verify_payment_step(&admin, &code).await.unwrap();
        ceremonies.cancel(&admin.id);
        assert_eq!(ceremonies.stage_of(&admin.id), CeremonyStage::Idle);
    }

    #[tokio::test]
    async fn payment_step_requires_an_enrolled_factor() {
        let totp = engine();
        let mut admin = admin_with_factors(&totp);
        admin.payment_enabled = false;
        let (ceremonies, _) = ceremonies(totp.clone(), DEFAULT_CEREMONY_TTL);

        let err = ceremonies
            .verify_payment_step(&admin, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, MfaError::Forbidden(_)));
    }
}
