//! Computed payout plan types.
//!
//! A [`PayoutPlan`] is the deterministic output of the payout calculator:
//! given a market, its commitments and a winning option, it fixes the fee
//! split, every per-commitment payout, per-user totals, and a
//! self-verification block. The plan itself is pure data — applying it to
//! balances is the resolution coordinator's job.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CommitmentId, MarketId, OptionId, UserId};

/// How a commitment's effective option was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutClassification {
    /// Explicit option reference (generic N-option scheme).
    Explicit,
    /// Mapped from a legacy binary side label on a two-sided market.
    LegacyDerived,
    /// Carried both an explicit reference and a side label, and they agreed.
    Hybrid,
}

impl std::fmt::Display for PayoutClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "EXPLICIT"),
            Self::LegacyDerived => write!(f, "LEGACY_DERIVED"),
            Self::Hybrid => write!(f, "HYBRID"),
        }
    }
}

/// The computed outcome for a single commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentPayout {
    pub commitment_id: CommitmentId,
    pub user_id: UserId,
    /// Canonical option ID after derivation.
    pub effective_option_id: OptionId,
    pub classification: PayoutClassification,
    pub is_winner: bool,
    pub tokens_staked: u64,
    /// Winner's fraction of the total winning-side stake; zero for losers.
    pub win_share: Decimal,
    /// `floor(win_share × winner_pool)`; zero for losers.
    pub payout_amount: u64,
    /// `payout_amount − tokens_staked`.
    pub profit: i64,
}

/// Per-user totals across all of a user's commitments in the market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayoutTotal {
    pub tokens_staked: u64,
    pub payout_amount: u64,
}

/// Counts of commitments per derivation path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub explicit: usize,
    pub legacy_derived: usize,
    pub hybrid: usize,
}

impl ClassificationSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.explicit + self.legacy_derived + self.hybrid
    }

    pub fn record(&mut self, classification: PayoutClassification) {
        match classification {
            PayoutClassification::Explicit => self.explicit += 1,
            PayoutClassification::LegacyDerived => self.legacy_derived += 1,
            PayoutClassification::Hybrid => self.hybrid += 1,
        }
    }
}

/// Self-verification flags computed alongside the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationBlock {
    /// Every input commitment produced exactly one payout entry.
    pub all_commitments_processed: bool,
    /// All commitment IDs in the plan are unique.
    pub no_double_payouts: bool,
    /// `Σ payout_amount ≤ winner_pool`, within the floor-rounding
    /// tolerance of one token per winner.
    pub payout_sums_correct: bool,
    /// Every payout entry carries a classification.
    pub audit_trail_complete: bool,
}

impl VerificationBlock {
    /// All flags true — the expected state for a plan this engine built.
    #[must_use]
    pub fn all_true() -> Self {
        Self {
            all_commitments_processed: true,
            no_double_payouts: true,
            payout_sums_correct: true,
            audit_trail_complete: true,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.all_commitments_processed
            && self.no_double_payouts
            && self.payout_sums_correct
            && self.audit_trail_complete
    }
}

/// The full deterministic payout plan for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutPlan {
    pub market_id: MarketId,
    pub winning_option_id: OptionId,
    /// Σ tokens over all commitments.
    pub total_pool: u64,
    /// `floor(total_pool × 0.05)` — fixed platform rate.
    pub house_fee: u64,
    /// `floor(total_pool × creator_fee_rate)`.
    pub creator_fee: u64,
    /// `total_pool − house_fee − creator_fee`.
    pub winner_pool: u64,
    /// Σ tokens over winning commitments.
    pub total_winning_tokens: u64,
    /// `winner_pool − Σ payout_amount` when nobody matched the winning
    /// option; retained as platform float. Zero whenever winners exist.
    pub unclaimed_pool: u64,
    /// Floor-rounding loss: `winner_pool − Σ payout_amount` when winners
    /// exist. Always `< winner count`.
    pub rounding_remainder: u64,
    pub payouts: Vec<CommitmentPayout>,
    /// Deterministic per-user aggregation (BTreeMap for stable iteration).
    pub user_totals: BTreeMap<UserId, UserPayoutTotal>,
    pub classification_summary: ClassificationSummary,
    pub verification: VerificationBlock,
}

impl PayoutPlan {
    /// Number of winning commitments.
    #[must_use]
    pub fn winner_count(&self) -> usize {
        self.payouts.iter().filter(|p| p.is_winner).count()
    }

    /// Σ payout over all entries.
    #[must_use]
    pub fn total_paid_out(&self) -> u64 {
        self.payouts.iter().map(|p| p.payout_amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_summary_counts() {
        let mut summary = ClassificationSummary::default();
        summary.record(PayoutClassification::Explicit);
        summary.record(PayoutClassification::Explicit);
        summary.record(PayoutClassification::LegacyDerived);
        summary.record(PayoutClassification::Hybrid);
        assert_eq!(summary.explicit, 2);
        assert_eq!(summary.legacy_derived, 1);
        assert_eq!(summary.hybrid, 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn verification_passed() {
        assert!(VerificationBlock::all_true().passed());
        let mut block = VerificationBlock::all_true();
        block.no_double_payouts = false;
        assert!(!block.passed());
    }

    #[test]
    fn classification_display() {
        assert_eq!(format!("{}", PayoutClassification::Explicit), "EXPLICIT");
        assert_eq!(
            format!("{}", PayoutClassification::LegacyDerived),
            "LEGACY_DERIVED"
        );
        assert_eq!(format!("{}", PayoutClassification::Hybrid), "HYBRID");
    }
}
