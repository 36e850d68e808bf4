//! # poolsettle-ledger
//!
//! **Commitment Ledger**: the atomic operation that moves tokens from a
//! user's available balance into a market pool.
//!
//! ## Commit flow
//!
//! ```text
//! commit() → validate request
//!          → run_transaction:
//!              balance debit/credit → participant check → write commitment
//!              → update market aggregates + percentages
//! ```
//!
//! All five steps inside the transaction commit together or not at all;
//! concurrent commits to the same market retry on write conflict and
//! surface the retryable `TransactionFailed` error when the budget runs out.

pub mod ledger;

pub use ledger::{CommitReceipt, CommitmentLedger};
