//! TOTP (Time-based One-Time Password) engine.
//!
//! Generates secrets and provisioning URIs, renders them as scannable QR
//! codes, and verifies submitted codes against the RFC 6238 time-step
//! algorithm with a ±1 step window for clock drift.

use crate::error::{MfaError, Result};
use totp_rs::{Algorithm, Secret, TOTP};

/// Configuration for TOTP generation.
#[derive(Clone)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Algorithm (default: SHA1 for authenticator-app compatibility).
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "RadioIQ".to_string(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    /// Create a new TOTP config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }
}

/// Data returned when staging a new secret for an owner.
#[derive(Debug)]
pub struct TotpSetup {
    /// Base32-encoded secret material.
    pub secret: String,
    /// Provisioning URI (otpauth://...).
    pub uri: String,
    /// QR code rendering of the URI as a data URL (`data:image/png;base64,...`)
    /// suitable for direct embedding in an `img src`.
    pub qr_code_url: String,
}

/// Generates secrets and verifies one-time codes.
///
/// Stateless beyond its configuration; the same engine instance serves every
/// secret namespace (admin factor, payment factor, tier factors, devices).
#[derive(Clone)]
pub struct TotpEngine {
    config: TotpConfig,
}

impl TotpEngine {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret plus provisioning URI and QR code for `account_label`.
    ///
    /// No side effects beyond randomness consumption; the caller decides where
    /// the secret is staged.
    pub fn generate_setup(&self, account_label: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_label)?;
        let uri = totp.get_url();

        let qr_code = totp
            .get_qr_base64()
            .map_err(|e| MfaError::internal(format!("failed to render QR code: {}", e)))?;

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
            qr_code_url: format!("data:image/png;base64,{}", qr_code),
        })
    }

    /// Verify a submitted code against a stored secret.
    ///
    /// Accepts the code for the current 30-second step or either adjacent
    /// step, so codes up to one step stale (or early) still pass.
    pub fn verify(&self, secret: &str, code: &str, account_label: &str) -> Result<bool> {
        let totp = self.build_totp(secret, account_label)?;

        // Clean the code (users paste with spaces or dashes)
        let code = code.replace([' ', '-'], "");

        match totp.check_current(&code) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                tracing::warn!(error = %e, "TOTP verification error (system time issue?)");
                // Report failure rather than error; don't leak why verification failed
                Ok(false)
            }
        }
    }

    /// Verify against a specific Unix timestamp.
    pub fn verify_at(&self, secret: &str, code: &str, account_label: &str, time: u64) -> Result<bool> {
        let totp = self.build_totp(secret, account_label)?;
        let code = code.replace([' ', '-'], "");
        Ok(totp.check(&code, time))
    }

    /// Generate the code for the current time step.
    ///
    /// Used by provisioning displays and tests; requires the secret, so it
    /// grants nothing a holder of the secret does not already have.
    pub fn generate_current(&self, secret: &str, account_label: &str) -> Result<String> {
        let totp = self.build_totp(secret, account_label)?;
        totp.generate_current()
            .map_err(|e| MfaError::internal(format!("failed to generate TOTP: {}", e)))
    }

    /// Generate the code for a specific Unix timestamp.
    pub fn generate_at(&self, secret: &str, account_label: &str, time: u64) -> Result<String> {
        let totp = self.build_totp(secret, account_label)?;
        Ok(totp.generate(time))
    }

    fn build_totp(&self, secret: &str, account_label: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            1, // 1 step skew tolerance
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| MfaError::internal(format!("invalid TOTP secret: {}", e)))?,
            Some(self.config.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| MfaError::internal(format!("failed to create TOTP: {}", e)))
    }
}

impl Default for TotpEngine {
    fn default() -> Self {
        Self::new(TotpConfig::default())
    }
}
