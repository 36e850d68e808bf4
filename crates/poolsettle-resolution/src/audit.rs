//! Independent verification of payout plans.
//!
//! [`verify`] re-derives the structural invariants of a [`PayoutPlan`]
//! from scratch rather than trusting the plan's own verification block.
//! It never mutates anything and never fails: a broken plan produces a
//! report with failed checks, not an error.

use std::collections::HashSet;

use poolsettle_types::{Commitment, PayoutPlan};

/// Outcome of auditing a payout plan against its input commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReport {
    /// Every input commitment appears in the plan exactly once.
    pub all_commitments_processed: bool,
    /// No commitment ID appears more than once among the payouts.
    pub no_double_payouts: bool,
    /// Paid winner amounts sum to the winner pool minus a remainder
    /// strictly smaller than the winner count.
    pub payout_sums_correct: bool,
    /// Classification counts add up to the number of payouts.
    pub audit_trail_complete: bool,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.all_commitments_processed
            && self.no_double_payouts
            && self.payout_sums_correct
            && self.audit_trail_complete
    }
}

/// Audit `plan` against the commitments it was computed from.
pub fn verify(plan: &PayoutPlan, input_commitments: &[Commitment]) -> AuditReport {
    let mut seen = HashSet::with_capacity(plan.payouts.len());
    let mut no_double_payouts = true;
    for payout in &plan.payouts {
        if !seen.insert(payout.commitment_id) {
            no_double_payouts = false;
        }
    }

    let all_commitments_processed = plan.payouts.len() == input_commitments.len()
        && input_commitments.iter().all(|c| seen.contains(&c.id));

    let total_paid: u64 = plan.payouts.iter().map(|p| p.payout_amount).sum();
    let winner_count = plan.payouts.iter().filter(|p| p.is_winner).count() as u64;
    let payout_sums_correct = if winner_count == 0 {
        total_paid == 0 && plan.unclaimed_pool == plan.winner_pool
    } else {
        total_paid + plan.rounding_remainder == plan.winner_pool
            && plan.rounding_remainder < winner_count
    };

    let audit_trail_complete = plan.classification_summary.total() == plan.payouts.len();

    AuditReport {
        all_commitments_processed,
        no_double_payouts,
        payout_sums_correct,
        audit_trail_complete,
    }
}
