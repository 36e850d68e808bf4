//! Commitment model: a user's token stake on one market option.
//!
//! A commitment is immutable once created except for status, `resolved_at`
//! and the payout fields, which are set exactly once at resolution (or at
//! most twice when a rollback resets them).
//!
//! [`StakeTarget`] is the single tagged union resolving the historical
//! option-identification duality: the legacy two-sided scheme stored a
//! yes/no side label, the generic scheme stores an explicit option ID, and
//! records written during the migration window carry both. Derivation to a
//! canonical option ID happens exactly once, in the payout calculator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CommitmentId, MarketId, OptionId, UserId};
#[cfg(any(test, feature = "test-helpers"))]
use crate::Market;

/// Legacy binary side label from the two-sided scheme.
///
/// On a two-option market, `Yes` maps to the first option and `No` to the
/// second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinarySide {
    Yes,
    No,
}

impl BinarySide {
    /// Index of the option this side maps to in `Market::options`.
    #[must_use]
    pub fn option_index(self) -> usize {
        match self {
            Self::Yes => 0,
            Self::No => 1,
        }
    }
}

impl std::fmt::Display for BinarySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Which option a commitment is staked on, across both identification
/// schemes.
///
/// - `Explicit`: generic N-option scheme, stores the option ID directly.
/// - `Legacy`: two-sided scheme, stores only a side label.
/// - `Hybrid`: migration-window records carrying both; they must agree.
///
/// A record lacking both cannot be represented, so the "neither field
/// present" corruption class of the legacy store is unrepresentable here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeTarget {
    Explicit(OptionId),
    Legacy(BinarySide),
    Hybrid { option_id: OptionId, side: BinarySide },
}

impl StakeTarget {
    /// The explicit option ID, if this target carries one.
    #[must_use]
    pub fn explicit_option_id(&self) -> Option<&OptionId> {
        match self {
            Self::Explicit(id) | Self::Hybrid { option_id: id, .. } => Some(id),
            Self::Legacy(_) => None,
        }
    }

    /// The legacy side label, if this target carries one.
    #[must_use]
    pub fn legacy_side(&self) -> Option<BinarySide> {
        match self {
            Self::Legacy(side) | Self::Hybrid { side, .. } => Some(*side),
            Self::Explicit(_) => None,
        }
    }
}

/// Lifecycle status of a commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitmentStatus {
    Active,
    Won,
    Lost,
    Refunded,
}

impl std::fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Won => write!(f, "WON"),
            Self::Lost => write!(f, "LOST"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// Point-in-time snapshot of market odds and participation, captured in
/// the same transaction that creates the commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Per-option `(option_id, total_tokens, participant_count)` after the
    /// commitment was applied.
    pub option_totals: Vec<(OptionId, u64, u64)>,
    pub total_tokens_staked: u64,
    pub total_participants: u64,
}

/// A user's token stake on one market option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: CommitmentId,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub target: StakeTarget,
    /// Positive integer token stake.
    pub tokens_committed: u64,
    /// Pool odds at commit time (post-commit market pool / option pool).
    pub odds_at_commitment: Decimal,
    /// `floor(tokens_committed × odds_at_commitment)` — display estimate,
    /// not a settlement promise.
    pub potential_winning: u64,
    pub status: CommitmentStatus,
    pub snapshot: MarketSnapshot,
    /// Set exactly once at resolution; `None` while active or refunded.
    pub payout_amount: Option<u64>,
    /// `payout_amount − tokens_committed`; negative when fees eat the gain.
    pub profit: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Commitment {
    /// Whether this commitment still locks tokens.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CommitmentStatus::Active
    }

    /// Reset resolution fields back to the active state (rollback path).
    pub fn reset_to_active(&mut self) {
        self.status = CommitmentStatus::Active;
        self.payout_amount = None;
        self.profit = None;
        self.resolved_at = None;
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Commitment {
    /// An active commitment with an empty snapshot.
    pub fn dummy(
        user_id: UserId,
        market_id: MarketId,
        target: StakeTarget,
        tokens: u64,
    ) -> Self {
        Self {
            id: CommitmentId::new(),
            user_id,
            market_id,
            target,
            tokens_committed: tokens,
            odds_at_commitment: Decimal::ONE,
            potential_winning: tokens,
            status: CommitmentStatus::Active,
            snapshot: MarketSnapshot {
                option_totals: Vec::new(),
                total_tokens_staked: 0,
                total_participants: 0,
            },
            payout_amount: None,
            profit: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// An explicit-scheme commitment on `market`'s option `option_id`.
    pub fn dummy_on(market: &Market, user_id: UserId, option_id: &str, tokens: u64) -> Self {
        Self::dummy(
            user_id,
            market.id,
            StakeTarget::Explicit(OptionId::from(option_id)),
            tokens,
        )
    }
}
