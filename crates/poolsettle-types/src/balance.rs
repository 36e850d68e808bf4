//! User token balance with available/committed accounting.
//!
//! `available + committed` changes only by the exact amount moved in one
//! atomic operation (commit, payout credit, refund, or pool retention at
//! resolution). Amounts are unsigned, so a balance can never go negative;
//! every debit is checked first.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Token balance for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    /// Usable for new commitments.
    pub available_tokens: u64,
    /// Locked in active commitments awaiting resolution.
    pub committed_tokens: u64,
    /// Lifetime payout credits received.
    pub total_earned: u64,
    /// Lifetime stake lost to resolved markets.
    pub total_spent: u64,
    /// Monotonically increasing counter used for optimistic conflict
    /// detection. Bumped on every mutation.
    pub version: u64,
}

impl UserBalance {
    /// A fresh zero balance for `user_id`.
    #[must_use]
    pub fn zero(user_id: UserId) -> Self {
        Self {
            user_id,
            available_tokens: 0,
            committed_tokens: 0,
            total_earned: 0,
            total_spent: 0,
            version: 0,
        }
    }

    /// Total tokens held (available + committed).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.available_tokens + self.committed_tokens
    }

    /// Whether this balance holds no tokens at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available_tokens == 0 && self.committed_tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_balance() {
        let bal = UserBalance::zero(UserId::new());
        assert!(bal.is_zero());
        assert_eq!(bal.total(), 0);
        assert_eq!(bal.version, 0);
    }

    #[test]
    fn total_sums_both_sides() {
        let mut bal = UserBalance::zero(UserId::new());
        bal.available_tokens = 700;
        bal.committed_tokens = 300;
        assert_eq!(bal.total(), 1000);
        assert!(!bal.is_zero());
    }

    #[test]
    fn serde_roundtrip() {
        let mut bal = UserBalance::zero(UserId::new());
        bal.available_tokens = 42;
        bal.version = 3;
        let json = serde_json::to_string(&bal).unwrap();
        let back: UserBalance = serde_json::from_str(&json).unwrap();
        assert_eq!(bal, back);
    }
}
