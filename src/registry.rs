//! Staged-secret registry.
//!
//! Holds secrets that have been generated but not yet proven: an owner must
//! submit a valid code before the staged entry is promoted to a durable
//! factor. Entries have a bounded lifetime and a staged secret can be
//! consumed exactly once.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default lifetime of a staged secret.
pub const DEFAULT_STAGED_TTL: Duration = Duration::from_secs(300);

/// A staged (not-yet-confirmed) secret.
#[derive(Debug, Clone)]
pub struct StagedSecret {
    /// Base32-encoded secret material.
    pub secret: String,
    /// Display label captured at staging time (email, device name, ...).
    pub label: String,
}

/// Trait for staging and consuming pending secrets.
///
/// Implementations must make [`consume`](SecretRegistry::consume) a single
/// atomic take: under concurrent confirmation calls for the same owner key,
/// at most one caller may receive the entry. A store with native per-key
/// expiry and atomic delete (e.g. Redis `GETDEL`) satisfies this directly;
/// the in-memory implementation does it under a write lock.
#[async_trait]
pub trait SecretRegistry: Send + Sync {
    /// Stage a secret for `owner`, replacing any prior staged secret for the
    /// same key (re-initiating enrollment is idempotent).
    async fn stage(&self, owner: &str, entry: StagedSecret) -> Result<()>;

    /// Read the staged secret without consuming it.
    ///
    /// Used by flows that must leave the entry in place when code
    /// verification fails, so the owner can retry before expiry.
    async fn peek(&self, owner: &str) -> Result<Option<StagedSecret>>;

    /// Atomically take and delete the staged secret.
    ///
    /// Returns `None` if the entry is absent, already consumed, or expired.
    async fn consume(&self, owner: &str) -> Result<Option<StagedSecret>>;
}

/// In-memory registry with per-entry TTL.
///
/// Expired entries read as absent even before they are garbage collected;
/// collection happens opportunistically on writes.
pub struct InMemorySecretRegistry {
    ttl: Duration,
    entries: RwLock<HashMap<String, (StagedSecret, Instant)>>,
}

impl InMemorySecretRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, staged_at: Instant) -> bool {
        staged_at.elapsed() <= self.ttl
    }
}

impl Default for InMemorySecretRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STAGED_TTL)
    }
}

#[async_trait]
impl SecretRegistry for InMemorySecretRegistry {
    async fn stage(&self, owner: &str, entry: StagedSecret) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, (_, staged_at)| staged_at.elapsed() <= self.ttl);
        entries.insert(owner.to_string(), (entry, Instant::now()));
        Ok(())
    }

    async fn peek(&self, owner: &str) -> Result<Option<StagedSecret>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(owner)
            .filter(|(_, staged_at)| self.is_fresh(*staged_at))
            .map(|(entry, _)| entry.clone()))
    }

    async fn consume(&self, owner: &str) -> Result<Option<StagedSecret>> {
        // Remove-then-check keeps take-and-delete a single operation under
        // the write lock; a stale entry is dropped either way.
        let mut entries = self.entries.write().unwrap();
        Ok(entries
            .remove(owner)
            .filter(|(_, staged_at)| self.is_fresh(*staged_at))
            .map(|(entry, _)| entry))
    }
}
