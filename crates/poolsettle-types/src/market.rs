//! Market model: a set of mutually exclusive options with an eventual
//! single winning option.
//!
//! Aggregates (`total_tokens`, `participant_count`, display percentages)
//! are maintained by the CommitmentLedger inside the same transaction that
//! writes the commitment. Invariant:
//! `total_tokens_staked == Σ option.total_tokens`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketId, OptionId, UserId};

/// Lifecycle status of a market.
///
/// Transitions are monotonic (`Active → PendingResolution → Resolved |
/// Cancelled`) except for the explicit, logged rollback edge
/// `Resolved → PendingResolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStatus {
    Active,
    PendingResolution,
    Resolved,
    Cancelled,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::PendingResolution => write!(f, "PENDING_RESOLUTION"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A single stakeable option within a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOption {
    pub id: OptionId,
    /// Display text shown to users.
    pub label: String,
    /// Total tokens staked on this option.
    pub total_tokens: u64,
    /// Distinct users with an active commitment on this option.
    pub participant_count: u64,
    /// Display percentage of the market pool, recomputed on every commit.
    pub percentage: Decimal,
}

/// A discrete-option staking market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    /// The question this market resolves.
    pub question: String,
    /// Ordered list of options. For legacy two-sided markets the first
    /// option is the YES side and the second the NO side.
    pub options: Vec<MarketOption>,
    pub status: MarketStatus,
    /// Total tokens staked across all options.
    pub total_tokens_staked: u64,
    /// Distinct users with at least one active commitment in this market.
    pub total_participants: u64,
    /// Set exactly once at resolution; cleared again only by rollback.
    pub winning_option_id: Option<OptionId>,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every store write.
    pub version: u64,
}

impl Market {
    /// Create a new active market with zeroed aggregates.
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        creator_id: UserId,
        options: Vec<(OptionId, String)>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MarketId::new(),
            question: question.into(),
            options: options
                .into_iter()
                .map(|(id, label)| MarketOption {
                    id,
                    label,
                    total_tokens: 0,
                    participant_count: 0,
                    percentage: Decimal::ZERO,
                })
                .collect(),
            status: MarketStatus::Active,
            total_tokens_staked: 0,
            total_participants: 0,
            winning_option_id: None,
            creator_id,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Look up an option by ID.
    #[must_use]
    pub fn option(&self, option_id: &OptionId) -> Option<&MarketOption> {
        self.options.iter().find(|o| &o.id == option_id)
    }

    /// Mutable lookup of an option by ID.
    pub fn option_mut(&mut self, option_id: &OptionId) -> Option<&mut MarketOption> {
        self.options.iter_mut().find(|o| &o.id == option_id)
    }

    /// Whether `option_id` belongs to this market.
    #[must_use]
    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.option(option_id).is_some()
    }

    /// Whether this is a legacy-compatible two-sided market.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        self.options.len() == 2
    }

    /// Recompute display percentages from current option aggregates.
    pub fn recompute_percentages(&mut self) {
        let total = self.total_tokens_staked;
        for option in &mut self.options {
            option.percentage = if total == 0 {
                Decimal::ZERO
            } else {
                (Decimal::from(option.total_tokens) / Decimal::from(total)
                    * Decimal::ONE_HUNDRED)
                    .round_dp(2)
            };
        }
    }

    /// Check the aggregate invariant: market total equals the option sum.
    #[must_use]
    pub fn aggregates_consistent(&self) -> bool {
        self.total_tokens_staked == self.options.iter().map(|o| o.total_tokens).sum::<u64>()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Market {
    /// A two-sided yes/no market, the legacy-compatible shape.
    pub fn dummy_binary() -> Self {
        Self::new(
            "Will it settle?",
            UserId::new(),
            vec![
                (OptionId::from("yes"), "Yes".to_string()),
                (OptionId::from("no"), "No".to_string()),
            ],
        )
    }

    /// An N-option market with options `opt-0 .. opt-{n-1}`.
    pub fn dummy_n_options(n: usize) -> Self {
        Self::new(
            "Which one?",
            UserId::new(),
            (0..n)
                .map(|i| (OptionId::new(format!("opt-{i}")), format!("Option {i}")))
                .collect(),
        )
    }
}
