//! Resolution lifecycle records: evidence, the persisted resolution
//! summary, and the append-only action log.
//!
//! Log entries are write-once and never mutated or deleted; resolution
//! status is reconstructed purely from the ordered log rather than from a
//! separate state field.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AdminId, CommitmentId, MarketId, OptionId, ResolutionId, UserId};

/// Kind of a single piece of resolution evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceKind {
    Url,
    Description,
}

/// One piece of evidence supporting a resolution decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    /// The URL itself, or the description text.
    pub content: String,
    /// Optional caption for URL evidence.
    pub description: Option<String>,
}

impl Evidence {
    #[must_use]
    pub fn url(content: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Url,
            content: content.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn description(content: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Description,
            content: content.into(),
            description: None,
        }
    }

    /// Structural validity check: URLs must be http(s) with a host,
    /// descriptions must be non-empty.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            EvidenceKind::Url => {
                let rest = self
                    .content
                    .strip_prefix("https://")
                    .or_else(|| self.content.strip_prefix("http://"));
                rest.is_some_and(|host| {
                    !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace)
                })
            }
            EvidenceKind::Description => !self.content.trim().is_empty(),
        }
    }
}

/// A winner's applied balance credit, kept on the resolution record so a
/// rollback can reverse it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPayout {
    pub commitment_id: CommitmentId,
    pub user_id: UserId,
    pub tokens_staked: u64,
    pub payout_amount: u64,
    pub is_winner: bool,
}

/// Write-once summary of a completed resolution. Read back by rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: ResolutionId,
    pub market_id: MarketId,
    pub winning_option_id: OptionId,
    pub admin_id: AdminId,
    pub creator_fee_rate: Decimal,
    pub total_pool: u64,
    pub house_fee: u64,
    pub creator_fee: u64,
    pub winner_pool: u64,
    pub rounding_remainder: u64,
    pub unclaimed_pool: u64,
    /// Every commitment touched by this resolution, with the exact amounts
    /// applied.
    pub applied_payouts: Vec<AppliedPayout>,
    pub resolved_at: DateTime<Utc>,
}

/// Lifecycle action recorded in the append-only resolution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionAction {
    ResolutionStarted,
    EvidenceValidated,
    PayoutsCalculated,
    ResolutionCompleted,
    ResolutionFailed,
    RollbackInitiated,
    RollbackCompleted,
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolutionStarted => write!(f, "RESOLUTION_STARTED"),
            Self::EvidenceValidated => write!(f, "EVIDENCE_VALIDATED"),
            Self::PayoutsCalculated => write!(f, "PAYOUTS_CALCULATED"),
            Self::ResolutionCompleted => write!(f, "RESOLUTION_COMPLETED"),
            Self::ResolutionFailed => write!(f, "RESOLUTION_FAILED"),
            Self::RollbackInitiated => write!(f, "ROLLBACK_INITIATED"),
            Self::RollbackCompleted => write!(f, "ROLLBACK_COMPLETED"),
        }
    }
}

/// One append-only log entry. Cancel flows reuse the started/completed
/// actions and tag themselves through `note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionLogEntry {
    pub market_id: MarketId,
    pub action: ResolutionAction,
    pub admin_id: AdminId,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
    pub note: Option<String>,
}

impl ResolutionLogEntry {
    #[must_use]
    pub fn new(market_id: MarketId, action: ResolutionAction, admin_id: AdminId) -> Self {
        Self {
            market_id,
            action,
            admin_id,
            at: Utc::now(),
            error: None,
            note: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Resolution status reconstructed from the ordered log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    /// No log entries for the market.
    NotStarted,
    /// Last action is `ResolutionCompleted`.
    Completed,
    /// Last action is `ResolutionFailed`, carrying its error.
    Failed { error: Option<String> },
    /// Entries exist but the last one is neither completed nor failed.
    InProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_evidence_well_formed() {
        assert!(Evidence::url("https://example.com/result").is_well_formed());
        assert!(Evidence::url("http://example.com").is_well_formed());
        assert!(!Evidence::url("ftp://example.com").is_well_formed());
        assert!(!Evidence::url("https://").is_well_formed());
        assert!(!Evidence::url("https://bad host").is_well_formed());
        assert!(!Evidence::url("not a url").is_well_formed());
    }

    #[test]
    fn description_evidence_well_formed() {
        assert!(Evidence::description("Final score 3-1").is_well_formed());
        assert!(!Evidence::description("").is_well_formed());
        assert!(!Evidence::description("   ").is_well_formed());
    }

    #[test]
    fn action_display() {
        assert_eq!(
            format!("{}", ResolutionAction::ResolutionStarted),
            "RESOLUTION_STARTED"
        );
        assert_eq!(
            format!("{}", ResolutionAction::RollbackCompleted),
            "ROLLBACK_COMPLETED"
        );
    }

    #[test]
    fn log_entry_builders() {
        let entry = ResolutionLogEntry::new(
            MarketId::new(),
            ResolutionAction::ResolutionFailed,
            AdminId::new("ops-1"),
        )
        .with_error("boom")
        .with_note("cancel");
        assert_eq!(entry.error.as_deref(), Some("boom"));
        assert_eq!(entry.note.as_deref(), Some("cancel"));
    }

    #[test]
    fn log_entry_serde_roundtrip() {
        let entry = ResolutionLogEntry::new(
            MarketId::new(),
            ResolutionAction::PayoutsCalculated,
            AdminId::new("ops-2"),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: ResolutionLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
