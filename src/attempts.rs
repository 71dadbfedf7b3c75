//! Verification-attempt rate limiting.
//!
//! TOTP codes are six digits, so unlimited guessing would eventually land a
//! valid one. Every code-bearing endpoint checks this limiter, keyed by the
//! identity (or device) the attempt is against, before touching a factor.
//!
//! # Tracing Events
//!
//! - `mfa.verify.rate_limited` - Verification attempt blocked

use crate::error::{MfaError, Result};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Shrink the state store every N requests to prevent unbounded memory growth.
const SHRINK_INTERVAL: u64 = 1000;

/// Configuration for verification-attempt limiting.
#[derive(Clone, Debug)]
pub struct AttemptLimitConfig {
    /// Maximum verification attempts per window.
    pub max_attempts: u32,
    /// Time window in seconds.
    pub window_seconds: u64,
}

impl Default for AttemptLimitConfig {
    fn default() -> Self {
        Self {
            // Generous enough for mistyped codes and clock drift, far too
            // small to brute-force a six-digit space.
            max_attempts: 10,
            window_seconds: 300,
        }
    }
}

impl AttemptLimitConfig {
    pub fn new(max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            max_attempts,
            window_seconds,
        }
    }
}

type KeyedLimiter =
    RateLimiter<String, DashMapStateStore<String>, DefaultClock, NoOpMiddleware>;

/// Rate limiter for TOTP verification attempts, keyed by owner.
#[derive(Clone)]
pub struct VerifyAttemptLimiter {
    limiter: Arc<KeyedLimiter>,
    config: AttemptLimitConfig,
    request_count: Arc<AtomicU64>,
}

impl VerifyAttemptLimiter {
    pub fn new(config: AttemptLimitConfig) -> Self {
        let max_attempts = NonZeroU32::new(config.max_attempts.max(1))
            .expect("max_attempts should be positive");

        let quota = Quota::with_period(Duration::from_secs(config.window_seconds.max(1)))
            .expect("window_seconds should be positive")
            .allow_burst(max_attempts);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            config,
            request_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a verification attempt for `owner`.
    ///
    /// Returns an error with a retry-after hint once the owner's quota is
    /// exhausted. Attempts count whether or not the code turns out valid.
    pub fn check(&self, owner: &str) -> Result<()> {
        // Periodically shrink the state store
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count % SHRINK_INTERVAL == 0 && count > 0 {
            self.limiter.retain_recent();
        }

        match self.limiter.check_key(&owner.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until
                    .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
                let retry_after = wait.as_secs().max(1);
                tracing::warn!(
                    target: "mfa.verify.rate_limited",
                    owner = %owner,
                    retry_after_secs = retry_after,
                    max_attempts = self.config.max_attempts,
                    window_secs = self.config.window_seconds,
                    "Verification attempt rate limited"
                );
                Err(MfaError::TooManyRequests(format!(
                    "Too many verification attempts. Please try again in {} seconds.",
                    retry_after
                )))
            }
        }
    }

    pub fn config(&self) -> &AttemptLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_attempts_under_limit() {
        let limiter = VerifyAttemptLimiter::new(AttemptLimitConfig::new(5, 60));

        for i in 0..5 {
            assert!(
                limiter.check("admin-1").is_ok(),
                "attempt {} should be allowed",
                i + 1
            );
        }
    }

    #[test]
    fn blocks_attempts_over_limit() {
        let limiter = VerifyAttemptLimiter::new(AttemptLimitConfig::new(5, 60));

        for _ in 0..5 {
            limiter.check("admin-1").unwrap();
        }

        let err = limiter.check("admin-1").unwrap_err();
        assert!(matches!(err, MfaError::TooManyRequests(_)));
    }

    #[test]
    fn owners_have_separate_quotas() {
        let limiter = VerifyAttemptLimiter::new(AttemptLimitConfig::new(3, 60));

        for _ in 0..3 {
            limiter.check("admin-1").unwrap();
        }
        assert!(limiter.check("admin-1").is_err());
        assert!(limiter.check("box-7").is_ok());
    }

    #[test]
    fn retry_after_is_within_window() {
        let limiter = VerifyAttemptLimiter::new(AttemptLimitConfig::new(1, 60));
        limiter.check("admin-1").unwrap();

        match limiter.check("admin-1") {
            Err(MfaError::TooManyRequests(msg)) => {
                assert!(msg.contains("try again in"));
            }
            other => panic!("expected TooManyRequests, got {:?}", other),
        }
    }

    #[test]
    fn default_config() {
        let config = AttemptLimitConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.window_seconds, 300);
    }
}
