//! # poolsettle-types
//!
//! Shared types, errors, and configuration for the **PoolSettle**
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`MarketId`], [`UserId`], [`CommitmentId`], [`ResolutionId`], [`OptionId`], [`AdminId`]
//! - **Market model**: [`Market`], [`MarketOption`], [`MarketStatus`]
//! - **Commitment model**: [`Commitment`], [`CommitmentStatus`], [`StakeTarget`], [`BinarySide`], [`MarketSnapshot`]
//! - **Balance model**: [`UserBalance`]
//! - **Payout model**: [`PayoutPlan`], [`CommitmentPayout`], [`PayoutClassification`], [`VerificationBlock`]
//! - **Resolution model**: [`Resolution`], [`Evidence`], [`ResolutionLogEntry`], [`ResolutionAction`], [`ResolutionStatus`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`SettleError`] with `PS_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod commitment;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod market;
pub mod payout;
pub mod resolution;

// Re-export all primary types at crate root for ergonomic imports:
//   use poolsettle_types::{Market, Commitment, UserBalance, ...};

pub use balance::*;
pub use commitment::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use market::*;
pub use payout::*;
pub use resolution::*;

// Constants are accessed via `poolsettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
