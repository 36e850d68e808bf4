//! # poolsettle-store
//!
//! The transactional document store the settlement engine runs on.
//!
//! ## Architecture
//!
//! [`DocumentStore`] holds versioned Market and UserBalance documents plus
//! commitments, resolution records, and the append-only resolution log.
//! Mutating operations run through [`DocumentStore::run_transaction`]:
//!
//! 1. The transaction body executes against a snapshot via a [`Txn`]
//!    handle that records the version of every Market / UserBalance it
//!    reads and stages its writes.
//! 2. Commit validates the recorded versions against the live documents
//!    under the write lock, then applies all staged writes and bumps
//!    document versions.
//! 3. A version mismatch re-runs the whole body, up to a bounded retry
//!    count; exhaustion surfaces the retryable `TransactionFailed` error.
//!
//! Body errors abort immediately without retry and leave no writes applied.

pub mod document_store;

pub use document_store::{DocumentStore, Txn};
