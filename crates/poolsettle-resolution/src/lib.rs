//! # poolsettle-resolution
//!
//! **Resolution Plane**: payout calculation, audit verification, and the
//! market resolution lifecycle with rollback support.
//!
//! ## Architecture
//!
//! The ResolutionCoordinator drives a market through
//! `PENDING_RESOLUTION → RESOLVED | CANCELLED` (plus the exceptional
//! rollback edge back to `PENDING_RESOLUTION`):
//! 1. Validates evidence and preconditions
//! 2. Calls the pure [`payout`] calculator for a full [`PayoutPlan`]
//! 3. Validates the plan with the stateless [`audit`] verifier
//! 4. Applies the plan inside one atomic store transaction
//! 5. Appends the append-only resolution action log at every step
//!
//! A failed apply runs an explicit, retryable, logged compensation step
//! (status reset) before the typed error reaches the caller.
//!
//! [`PayoutPlan`]: poolsettle_types::PayoutPlan

pub mod audit;
pub mod coordinator;
pub mod payout;

pub use audit::{AuditReport, verify};
pub use coordinator::{CancelOutcome, ResolutionCoordinator, ResolutionOutcome};
pub use payout::{calculate, effective_option};
