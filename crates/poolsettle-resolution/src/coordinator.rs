//! Market resolution orchestration.
//!
//! The coordinator drives the market state machine (PendingResolution →
//! Resolved | Cancelled, plus the explicit rollback edge back to
//! PendingResolution), always through the same shape: validate outside the
//! transaction, apply atomically inside it, and record every attempt in
//! the append-only resolution log.
//!
//! Resolve and cancel exclude each other through the optimistic status
//! re-check inside their transactions; the loser of a race observes the
//! changed status and aborts without side effects.

use std::sync::Arc;

use chrono::Utc;
use poolsettle_types::{
    AdminId, AppliedPayout, CommitmentStatus, EngineConfig, Evidence, Market, MarketId,
    MarketStatus, OptionId, PayoutPlan, Resolution, ResolutionAction, ResolutionId,
    ResolutionLogEntry, ResolutionStatus, Result, SettleError, constants,
};
use poolsettle_store::DocumentStore;
use rust_decimal::Decimal;

use crate::audit::{self, AuditReport};
use crate::payout;

/// Returned by a successful [`ResolutionCoordinator::resolve_market`].
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub resolution_id: ResolutionId,
    pub plan: PayoutPlan,
    pub audit_report: AuditReport,
}

/// Returned by a successful [`ResolutionCoordinator::cancel_market`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub refunds_processed: usize,
    pub refunded_tokens: u64,
}

/// Orchestrates resolution, cancellation and rollback against the store.
pub struct ResolutionCoordinator {
    store: Arc<DocumentStore>,
    config: EngineConfig,
}

impl ResolutionCoordinator {
    pub fn new(store: Arc<DocumentStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Resolve `market_id` to `winning_option_id`, paying every winner and
    /// settling every loser in one atomic transaction.
    ///
    /// The market must be in `PendingResolution`. All validation happens
    /// before the transaction opens; if the atomic apply fails for any
    /// reason other than losing a status race, a logged compensation step
    /// resets the market to `PendingResolution` before the error is
    /// surfaced.
    ///
    /// # Errors
    /// - `MarketNotFound` / `MarketAlreadyResolved` / `MarketInactive`
    /// - `InvalidWinningOption`, `ValidationError` (fee rate)
    /// - `InsufficientEvidence`
    /// - calculator errors (`DuplicateCommitment`, `UnresolvableCommitment`)
    /// - `Internal` when the audit report fails
    /// - `TransactionFailed` when the atomic apply cannot commit
    pub fn resolve_market(
        &self,
        market_id: MarketId,
        winning_option_id: &OptionId,
        evidence: &[Evidence],
        admin_id: &AdminId,
        creator_fee_rate: Decimal,
    ) -> Result<ResolutionOutcome> {
        let market = self.require_pending(market_id)?;
        if !market.has_option(winning_option_id) {
            return Err(SettleError::InvalidWinningOption {
                market_id,
                option_id: winning_option_id.clone(),
            });
        }
        if !self.config.creator_fee_in_bounds(creator_fee_rate) {
            return Err(SettleError::ValidationError {
                reason: format!("creator fee rate {creator_fee_rate} outside configured bounds"),
            });
        }
        validate_evidence(evidence)?;

        self.store.append_log(ResolutionLogEntry::new(
            market_id,
            ResolutionAction::ResolutionStarted,
            admin_id.clone(),
        ));

        let commitments: Vec<_> = self
            .store
            .commitments_for_market(market_id)
            .into_iter()
            .filter(poolsettle_types::Commitment::is_active)
            .collect();

        let plan = match payout::calculate(&market, &commitments, winning_option_id, creator_fee_rate)
        {
            Ok(plan) => plan,
            Err(err) => {
                self.log_failure(market_id, admin_id, &err);
                return Err(err);
            }
        };
        let audit_report = audit::verify(&plan, &commitments);
        if !audit_report.passed() {
            let err = SettleError::Internal(format!(
                "payout plan failed independent verification: {audit_report:?}"
            ));
            self.log_failure(market_id, admin_id, &err);
            return Err(err);
        }

        self.store.append_log(ResolutionLogEntry::new(
            market_id,
            ResolutionAction::EvidenceValidated,
            admin_id.clone(),
        ));
        self.store.append_log(
            ResolutionLogEntry::new(market_id, ResolutionAction::PayoutsCalculated, admin_id.clone())
                .with_note(format!(
                    "pool={} winners={} winner_pool={}",
                    plan.total_pool,
                    plan.winner_count(),
                    plan.winner_pool
                )),
        );

        let attempt = self.store.resolution_count_for_market(market_id);
        let resolution_id = ResolutionId::deterministic(market_id, attempt);

        let apply = self.store.run_transaction(market_id, |txn| {
            self.apply_resolution(txn, &plan, resolution_id, admin_id, creator_fee_rate)
        });

        match apply {
            Ok(()) => {
                self.store.append_log(
                    ResolutionLogEntry::new(
                        market_id,
                        ResolutionAction::ResolutionCompleted,
                        admin_id.clone(),
                    )
                    .with_note(format!("resolution={resolution_id}")),
                );
                tracing::info!(
                    market = %market_id,
                    resolution = %resolution_id,
                    winning_option = %winning_option_id,
                    total_pool = plan.total_pool,
                    winners = plan.winner_count(),
                    "market resolved"
                );
                Ok(ResolutionOutcome {
                    resolution_id,
                    plan,
                    audit_report,
                })
            }
            // Losing the status race to a concurrent resolver/canceller is
            // not a failure of this market's state, so no compensation.
            Err(err @ (SettleError::MarketInactive { .. } | SettleError::MarketAlreadyResolved(_))) => {
                self.log_failure(market_id, admin_id, &err);
                Err(err)
            }
            Err(err) => {
                self.log_failure(market_id, admin_id, &err);
                self.compensate(market_id, admin_id, &err);
                Err(err)
            }
        }
    }

    /// Cancel a pending market, optionally refunding every active stake.
    ///
    /// # Errors
    /// `MarketNotFound`, `MarketAlreadyResolved`, `MarketInactive`, or
    /// `TransactionFailed` on persistent write conflicts.
    pub fn cancel_market(
        &self,
        market_id: MarketId,
        reason: &str,
        admin_id: &AdminId,
        refund: bool,
    ) -> Result<CancelOutcome> {
        self.require_pending(market_id)?;

        self.store.append_log(
            ResolutionLogEntry::new(market_id, ResolutionAction::ResolutionStarted, admin_id.clone())
                .with_note(format!("cancel: {reason}")),
        );

        let outcome = self.store.run_transaction(market_id, |txn| {
            let mut market = txn.market(market_id)?;
            check_pending(&market)?;

            let mut refunds_processed = 0usize;
            let mut refunded_tokens = 0u64;
            if refund {
                for mut commitment in txn.commitments_for_market(market_id) {
                    if !commitment.is_active() {
                        continue;
                    }
                    let mut balance = txn.balance_or_default(commitment.user_id);
                    balance.available_tokens += commitment.tokens_committed;
                    balance.committed_tokens = balance
                        .committed_tokens
                        .checked_sub(commitment.tokens_committed)
                        .ok_or(SettleError::BalanceUnderflow)?;
                    txn.put_balance(balance);

                    commitment.status = CommitmentStatus::Refunded;
                    commitment.resolved_at = Some(Utc::now());
                    refunds_processed += 1;
                    refunded_tokens += commitment.tokens_committed;
                    txn.put_commitment(commitment);
                }
            }

            market.status = MarketStatus::Cancelled;
            market.updated_at = Utc::now();
            txn.put_market(market);
            Ok(CancelOutcome {
                refunds_processed,
                refunded_tokens,
            })
        })?;

        self.store.append_log(
            ResolutionLogEntry::new(
                market_id,
                ResolutionAction::ResolutionCompleted,
                admin_id.clone(),
            )
            .with_note(format!(
                "cancel: {reason} (refunds={}, tokens={})",
                outcome.refunds_processed, outcome.refunded_tokens
            )),
        );
        tracing::info!(
            market = %market_id,
            refunds = outcome.refunds_processed,
            tokens = outcome.refunded_tokens,
            "market cancelled"
        );
        Ok(outcome)
    }

    /// Reverse a completed resolution, restoring balances and commitment
    /// statuses exactly and returning the market to `PendingResolution`.
    ///
    /// Rollback is terminal on failure: a winner who no longer holds the
    /// paid-out tokens leaves the market Resolved and surfaces
    /// `RollbackFailed` for operator intervention. There is no automatic
    /// retry.
    ///
    /// # Errors
    /// `RollbackFailed` for every failure mode, carrying the cause.
    pub fn rollback_resolution(
        &self,
        market_id: MarketId,
        resolution_id: ResolutionId,
        admin_id: &AdminId,
    ) -> Result<()> {
        let rollback_failed = |reason: String| SettleError::RollbackFailed {
            market_id,
            resolution_id,
            reason,
        };

        let resolution = self
            .store
            .resolution(resolution_id)
            .ok_or_else(|| rollback_failed("resolution record not found".into()))?;
        if resolution.market_id != market_id {
            return Err(rollback_failed(format!(
                "resolution belongs to market {}",
                resolution.market_id
            )));
        }

        self.store.append_log(
            ResolutionLogEntry::new(market_id, ResolutionAction::RollbackInitiated, admin_id.clone())
                .with_note(format!("resolution={resolution_id}")),
        );

        let apply = self.store.run_transaction(market_id, |txn| {
            let mut market = txn.market(market_id)?;
            if market.status != MarketStatus::Resolved {
                return Err(SettleError::ValidationError {
                    reason: format!("market is {}, not RESOLVED", market.status),
                });
            }
            if market.winning_option_id.as_ref() != Some(&resolution.winning_option_id) {
                return Err(SettleError::ValidationError {
                    reason: "market winning option does not match the resolution record".into(),
                });
            }

            for applied in &resolution.applied_payouts {
                let mut commitment = txn
                    .commitments_for_market(market_id)
                    .into_iter()
                    .find(|c| c.id == applied.commitment_id)
                    .ok_or_else(|| SettleError::ValidationError {
                        reason: format!("commitment {} missing", applied.commitment_id),
                    })?;
                let mut balance = txn.balance_or_default(applied.user_id);

                if applied.is_winner {
                    balance.available_tokens = balance
                        .available_tokens
                        .checked_sub(applied.payout_amount)
                        .ok_or_else(|| SettleError::ValidationError {
                            reason: format!(
                                "user {} no longer holds the paid-out {} tokens",
                                applied.user_id, applied.payout_amount
                            ),
                        })?;
                    balance.committed_tokens += applied.tokens_staked;
                    balance.total_earned = balance
                        .total_earned
                        .checked_sub(applied.payout_amount)
                        .ok_or(SettleError::BalanceUnderflow)?;
                } else {
                    balance.committed_tokens += applied.tokens_staked;
                    balance.total_spent = balance
                        .total_spent
                        .checked_sub(applied.tokens_staked)
                        .ok_or(SettleError::BalanceUnderflow)?;
                }
                txn.put_balance(balance);

                commitment.reset_to_active();
                txn.put_commitment(commitment);
            }

            market.status = MarketStatus::PendingResolution;
            market.winning_option_id = None;
            market.updated_at = Utc::now();
            txn.put_market(market);
            Ok(())
        });

        match apply {
            Ok(()) => {
                self.store.append_log(
                    ResolutionLogEntry::new(
                        market_id,
                        ResolutionAction::RollbackCompleted,
                        admin_id.clone(),
                    )
                    .with_note(format!("resolution={resolution_id}")),
                );
                tracing::info!(
                    market = %market_id,
                    resolution = %resolution_id,
                    reversed = resolution.applied_payouts.len(),
                    "resolution rolled back"
                );
                Ok(())
            }
            Err(err) => {
                let err = rollback_failed(err.to_string());
                self.store.append_log(
                    ResolutionLogEntry::new(
                        market_id,
                        ResolutionAction::ResolutionFailed,
                        admin_id.clone(),
                    )
                    .with_error(err.to_string())
                    .with_note(format!("rollback of resolution={resolution_id}")),
                );
                tracing::error!(
                    market = %market_id,
                    resolution = %resolution_id,
                    error = %err,
                    "rollback failed, market left resolved"
                );
                Err(err)
            }
        }
    }

    /// Reconstruct the market's resolution state purely from the log.
    pub fn resolution_status(&self, market_id: MarketId) -> ResolutionStatus {
        let log = self.store.log_for_market(market_id);
        match log.last() {
            None => ResolutionStatus::NotStarted,
            Some(entry) => match entry.action {
                ResolutionAction::ResolutionCompleted => ResolutionStatus::Completed,
                ResolutionAction::ResolutionFailed => ResolutionStatus::Failed {
                    error: entry.error.clone(),
                },
                _ => ResolutionStatus::InProgress,
            },
        }
    }

    fn require_pending(&self, market_id: MarketId) -> Result<Market> {
        let market = self
            .store
            .market(market_id)
            .ok_or(SettleError::MarketNotFound(market_id))?;
        check_pending(&market)?;
        Ok(market)
    }

    /// Apply a validated plan inside one transaction. The status re-check
    /// makes resolve lose cleanly to a concurrent resolver or canceller.
    fn apply_resolution(
        &self,
        txn: &mut poolsettle_store::Txn,
        plan: &PayoutPlan,
        resolution_id: ResolutionId,
        admin_id: &AdminId,
        creator_fee_rate: Decimal,
    ) -> Result<()> {
        let mut market = txn.market(plan.market_id)?;
        check_pending(&market)?;

        let commitments = txn.commitments_for_market(plan.market_id);
        let mut applied_payouts = Vec::with_capacity(plan.payouts.len());

        for entry in &plan.payouts {
            let mut commitment = commitments
                .iter()
                .find(|c| c.id == entry.commitment_id)
                .cloned()
                .ok_or_else(|| SettleError::ValidationError {
                    reason: format!("commitment {} missing at apply time", entry.commitment_id),
                })?;
            let mut balance = txn.balance_or_default(entry.user_id);

            balance.committed_tokens = balance
                .committed_tokens
                .checked_sub(entry.tokens_staked)
                .ok_or(SettleError::BalanceUnderflow)?;
            if entry.is_winner {
                balance.available_tokens += entry.payout_amount;
                balance.total_earned += entry.payout_amount;
                commitment.status = CommitmentStatus::Won;
            } else {
                balance.total_spent += entry.tokens_staked;
                commitment.status = CommitmentStatus::Lost;
            }
            txn.put_balance(balance);

            commitment.payout_amount = Some(entry.payout_amount);
            commitment.profit = Some(entry.profit);
            commitment.resolved_at = Some(Utc::now());
            txn.put_commitment(commitment);

            applied_payouts.push(AppliedPayout {
                commitment_id: entry.commitment_id,
                user_id: entry.user_id,
                tokens_staked: entry.tokens_staked,
                payout_amount: entry.payout_amount,
                is_winner: entry.is_winner,
            });
        }

        market.status = MarketStatus::Resolved;
        market.winning_option_id = Some(plan.winning_option_id.clone());
        market.updated_at = Utc::now();
        txn.put_market(market);

        txn.put_resolution(Resolution {
            id: resolution_id,
            market_id: plan.market_id,
            winning_option_id: plan.winning_option_id.clone(),
            admin_id: admin_id.clone(),
            creator_fee_rate,
            total_pool: plan.total_pool,
            house_fee: plan.house_fee,
            creator_fee: plan.creator_fee,
            winner_pool: plan.winner_pool,
            rounding_remainder: plan.rounding_remainder,
            unclaimed_pool: plan.unclaimed_pool,
            applied_payouts,
            resolved_at: Utc::now(),
        });
        Ok(())
    }

    fn log_failure(&self, market_id: MarketId, admin_id: &AdminId, err: &SettleError) {
        self.store.append_log(
            ResolutionLogEntry::new(market_id, ResolutionAction::ResolutionFailed, admin_id.clone())
                .with_error(err.to_string()),
        );
        tracing::warn!(market = %market_id, error = %err, "resolution failed");
    }

    /// Best-effort, logged reset back to `PendingResolution` after a
    /// failed apply. Bounded retries; exhaustion is logged, not surfaced,
    /// so the original apply error stays the caller-visible one. The
    /// compensation log entry carries that error too, keeping it readable
    /// from the tail of the log.
    fn compensate(&self, market_id: MarketId, admin_id: &AdminId, cause: &SettleError) {
        for attempt in 0..constants::MAX_COMPENSATION_RETRIES {
            let reset = self.store.run_transaction(market_id, |txn| {
                let mut market = txn.market(market_id)?;
                if market.status == MarketStatus::PendingResolution {
                    return Ok(());
                }
                market.status = MarketStatus::PendingResolution;
                market.winning_option_id = None;
                market.updated_at = Utc::now();
                txn.put_market(market);
                Ok(())
            });
            match reset {
                Ok(()) => {
                    self.store.append_log(
                        ResolutionLogEntry::new(
                            market_id,
                            ResolutionAction::ResolutionFailed,
                            admin_id.clone(),
                        )
                        .with_error(cause.to_string())
                        .with_note("compensation: market reset to PENDING_RESOLUTION"),
                    );
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        market = %market_id,
                        attempt,
                        error = %err,
                        "compensation attempt failed"
                    );
                }
            }
        }
        tracing::error!(
            market = %market_id,
            "compensation exhausted, market status requires operator attention"
        );
    }
}

fn check_pending(market: &Market) -> Result<()> {
    match market.status {
        MarketStatus::PendingResolution => Ok(()),
        MarketStatus::Resolved => Err(SettleError::MarketAlreadyResolved(market.id)),
        status => Err(SettleError::MarketInactive {
            market_id: market.id,
            status,
            required: MarketStatus::PendingResolution,
        }),
    }
}

fn validate_evidence(evidence: &[Evidence]) -> Result<()> {
    if evidence.len() < constants::MIN_EVIDENCE_ITEMS {
        return Err(SettleError::InsufficientEvidence {
            reason: format!(
                "at least {} evidence item(s) required",
                constants::MIN_EVIDENCE_ITEMS
            ),
        });
    }
    for item in evidence {
        if !item.is_well_formed() {
            return Err(SettleError::InsufficientEvidence {
                reason: "malformed evidence item".into(),
            });
        }
    }
    Ok(())
}
