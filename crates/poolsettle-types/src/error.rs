//! Error types for the PoolSettle settlement engine.
//!
//! All errors use the `PS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Balance errors
//! - 3xx: Market errors
//! - 4xx: Resolution / payout errors
//! - 5xx: Transaction errors
//! - 6xx: Rollback errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{CommitmentId, MarketId, MarketStatus, OptionId, ResolutionId};

/// Central error enum for all PoolSettle operations.
#[derive(Debug, Error)]
pub enum SettleError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A request failed validation before any transaction opened.
    #[error("PS_ERR_100: Validation failed: {reason}")]
    ValidationError { reason: String },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to commit the requested stake.
    #[error("PS_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    /// A balance move would produce a negative value.
    #[error("PS_ERR_201: Balance underflow")]
    BalanceUnderflow,

    // =================================================================
    // Market Errors (3xx)
    // =================================================================
    /// The requested market does not exist.
    #[error("PS_ERR_300: Market not found: {0}")]
    MarketNotFound(MarketId),

    /// The market is not in the status the operation requires.
    #[error("PS_ERR_301: Market {market_id} is {status}, operation requires {required}")]
    MarketInactive {
        market_id: MarketId,
        status: MarketStatus,
        required: MarketStatus,
    },

    /// The market has already been resolved.
    #[error("PS_ERR_302: Market already resolved: {0}")]
    MarketAlreadyResolved(MarketId),

    // =================================================================
    // Resolution / Payout Errors (4xx)
    // =================================================================
    /// The chosen winning option is not one of the market's options.
    #[error("PS_ERR_400: Invalid winning option {option_id} for market {market_id}")]
    InvalidWinningOption {
        market_id: MarketId,
        option_id: OptionId,
    },

    /// Evidence is missing or malformed.
    #[error("PS_ERR_401: Insufficient evidence: {reason}")]
    InsufficientEvidence { reason: String },

    /// The same commitment ID appeared more than once in a payout input
    /// (fail-fast double-payout guard).
    #[error("PS_ERR_402: Duplicate commitment in payout input: {0}")]
    DuplicateCommitment(CommitmentId),

    /// A commitment's stake target could not be resolved to a market option.
    #[error("PS_ERR_403: Unresolvable commitment {commitment_id}: {reason}")]
    UnresolvableCommitment {
        commitment_id: CommitmentId,
        reason: String,
    },

    // =================================================================
    // Transaction Errors (5xx)
    // =================================================================
    /// A transaction exhausted its conflict-retry budget or failed during
    /// apply. Retryable by the caller.
    #[error("PS_ERR_500: Transaction failed for market {market_id}: {reason}")]
    TransactionFailed { market_id: MarketId, reason: String },

    // =================================================================
    // Rollback Errors (6xx)
    // =================================================================
    /// A resolution rollback could not be applied. Terminal — requires
    /// manual operator intervention; the market keeps its resolved state.
    #[error("PS_ERR_600: Rollback {resolution_id} failed for market {market_id}: {reason}")]
    RollbackFailed {
        market_id: MarketId,
        resolution_id: ResolutionId,
        reason: String,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("PS_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

impl SettleError {
    /// Whether the caller may safely retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionFailed { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettleError>;

impl From<serde_json::Error> for SettleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = SettleError::MarketNotFound(MarketId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("PS_ERR_300"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = SettleError::InsufficientBalance {
            needed: 100,
            available: 50,
        };
        let msg = format!("{err}");
        assert!(msg.contains("PS_ERR_200"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn market_inactive_display() {
        let err = SettleError::MarketInactive {
            market_id: MarketId::new(),
            status: MarketStatus::Resolved,
            required: MarketStatus::PendingResolution,
        };
        let msg = format!("{err}");
        assert!(msg.contains("PS_ERR_301"));
        assert!(msg.contains("RESOLVED"));
        assert!(msg.contains("PENDING_RESOLUTION"));
    }

    #[test]
    fn only_transaction_failed_is_retryable() {
        let retryable = SettleError::TransactionFailed {
            market_id: MarketId::new(),
            reason: "write conflict".into(),
        };
        assert!(retryable.is_retryable());

        let terminal = SettleError::RollbackFailed {
            market_id: MarketId::new(),
            resolution_id: ResolutionId::new(),
            reason: "winner balance spent".into(),
        };
        assert!(!terminal.is_retryable());
        assert!(!SettleError::BalanceUnderflow.is_retryable());
    }

    #[test]
    fn all_errors_have_ps_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(SettleError::ValidationError {
                reason: "test".into(),
            }),
            Box::new(SettleError::BalanceUnderflow),
            Box::new(SettleError::MarketAlreadyResolved(MarketId::new())),
            Box::new(SettleError::DuplicateCommitment(CommitmentId::new())),
            Box::new(SettleError::Internal("test".into())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("PS_ERR_"),
                "Error missing PS_ERR_ prefix: {msg}"
            );
        }
    }
}
