//! Player Ledger
//!
//! Connected-player identity and wallet. A player's balance is mutated only
//! by the state machine's bet debit and settlement credit; nothing else in
//! the crate touches it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::GameError;

/// Money in minor units (cents). All wallet math is integer.
pub type Cents = u64;

/// Format minor units as a fixed two-decimal string ("150" -> "1.50").
pub fn format_amount(amount: Cents) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}

/// Convert a wire amount (major units) into minor units.
///
/// Rejects non-finite, non-positive, and absurdly large values.
pub fn cents_from_amount(amount: f64) -> Result<Cents, GameError> {
    const MAX_AMOUNT: f64 = 1e12;
    if !amount.is_finite() || amount <= 0.0 || amount > MAX_AMOUNT {
        return Err(GameError::InvalidWager);
    }
    let cents = (amount * 100.0).round() as Cents;
    if cents == 0 {
        return Err(GameError::InvalidWager);
    }
    Ok(cents)
}

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Derive a stable identifier from an external auth subject.
    pub fn from_subject(subject: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"crashline-player:");
        hasher.update(subject.as_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        Self(id)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// One connected player's wallet. Lifetime equals the connection lifetime;
/// a reconnect recreates it at the configured starting balance.
#[derive(Debug, Clone)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name for cosmetic feeds.
    pub display_name: String,
    /// Wallet currency code.
    pub currency: String,
    balance: Cents,
}

impl Player {
    /// Create a player with an opening balance.
    pub fn new(id: PlayerId, display_name: String, balance: Cents, currency: String) -> Self {
        Self {
            id,
            display_name,
            currency,
            balance,
        }
    }

    /// Current wallet balance in minor units.
    pub fn balance(&self) -> Cents {
        self.balance
    }

    /// Remove `amount` from the wallet. On failure the balance is untouched.
    pub fn debit(&mut self, amount: Cents) -> Result<(), GameError> {
        if amount > self.balance {
            return Err(GameError::InsufficientBalance);
        }
        self.balance -= amount;
        Ok(())
    }

    /// Add `amount` to the wallet.
    pub fn credit(&mut self, amount: Cents) {
        self.balance = self.balance.saturating_add(amount);
    }
}

// =============================================================================
// TESTS
// =============================================================================
