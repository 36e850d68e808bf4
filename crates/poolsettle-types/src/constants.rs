//! System-wide constants for the PoolSettle settlement engine.

/// Fixed platform (house) fee rate in basis points (5%).
pub const HOUSE_FEE_BPS: u32 = 500;

/// Minimum allowed creator fee rate in basis points (1%).
pub const MIN_CREATOR_FEE_BPS: u32 = 100;

/// Maximum allowed creator fee rate in basis points (5%).
pub const MAX_CREATOR_FEE_BPS: u32 = 500;

/// Default maximum tokens a single commitment may stake.
pub const DEFAULT_MAX_TOKENS_PER_COMMITMENT: u64 = 1_000_000;

/// Maximum automatic transaction retries on write conflict before the
/// transient `TransactionFailed` error is surfaced.
pub const MAX_TXN_RETRIES: u32 = 5;

/// Maximum automatic retries of the compensating status reset after a
/// failed resolution apply.
pub const MAX_COMPENSATION_RETRIES: u32 = 3;

/// Minimum number of evidence items required to resolve a market.
pub const MIN_EVIDENCE_ITEMS: usize = 1;
