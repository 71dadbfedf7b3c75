//! Credit ledger and tier definitions.
//!
//! The ledger owns the numeric balance for each identity and exposes the only
//! two mutation primitives, `credit` and `debit`. Higher-level flows (tier
//! grants, manual adjustments) compose them; nothing else writes a balance.

use crate::error::{MfaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixed credit-grant sizes.
///
/// Membership is closed: wire values outside 1..=5 are rejected before any
/// verification or ledger work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::One, Tier::Two, Tier::Three, Tier::Four, Tier::Five];

    /// Credit amount granted by this tier.
    pub fn amount(self) -> u64 {
        match self {
            Tier::One => 5_000,
            Tier::Two => 10_000,
            Tier::Three => 20_000,
            Tier::Four => 50_000,
            Tier::Five => 100_000,
        }
    }

    /// Wire number of this tier (1-based).
    pub fn number(self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
            Tier::Four => 4,
            Tier::Five => 5,
        }
    }

    /// Zero-based index, used to select the per-tier secret.
    pub fn index(self) -> usize {
        (self.number() - 1) as usize
    }

    pub fn from_number(n: u8) -> Option<Tier> {
        Tier::ALL.get(n.checked_sub(1)? as usize).copied()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(n: u8) -> std::result::Result<Self, Self::Error> {
        Tier::from_number(n).ok_or_else(|| format!("invalid tier: {}", n))
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.number()
    }
}

/// Trait for balance storage.
///
/// Both mutations require `amount > 0`, return the new balance, and must be
/// applied atomically per identity: a database implementation should use a
/// single conditional `UPDATE ... SET balance = balance + ?`, the in-memory
/// implementation holds one lock across the read-modify-write.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Current balance for an identity (0 if no account exists yet).
    async fn balance(&self, identity_id: &str) -> Result<u64>;

    /// Add `amount` to the balance, returning the new total.
    async fn credit(&self, identity_id: &str, amount: u64) -> Result<u64>;

    /// Subtract `amount` from the balance, returning the new total.
    ///
    /// Rejected if the balance would go negative; the balance is unchanged on
    /// failure.
    async fn debit(&self, identity_id: &str, amount: u64) -> Result<u64>;
}

/// In-memory ledger.
#[derive(Default)]
pub struct InMemoryTokenLedger {
    balances: Mutex<HashMap<String, u64>>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn balance(&self, identity_id: &str) -> Result<u64> {
        let balances = self.balances.lock().unwrap();
        Ok(balances.get(identity_id).copied().unwrap_or(0))
    }

    async fn credit(&self, identity_id: &str, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(MfaError::bad_request("Amount must be positive"));
        }
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(identity_id.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| MfaError::internal("balance overflow"))?;
        Ok(*balance)
    }

    async fn debit(&self, identity_id: &str, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(MfaError::bad_request("Amount must be positive"));
        }
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(identity_id.to_string()).or_insert(0);
        if *balance < amount {
            return Err(MfaError::bad_request("Insufficient tokens"));
        }
        *balance -= amount;
        Ok(*balance)
    }
}
