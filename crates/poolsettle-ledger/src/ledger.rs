//! The atomic stake-commit operation.
//!
//! A commit debits the user's available balance, credits committed balance,
//! writes the commitment record with a point-in-time odds snapshot, and
//! updates the market aggregates — all inside one store transaction.

use std::sync::Arc;

use chrono::Utc;
use poolsettle_store::DocumentStore;
use poolsettle_types::{
    BinarySide, Commitment, CommitmentId, CommitmentStatus, EngineConfig, Market, MarketId,
    MarketSnapshot, MarketStatus, OptionId, Result, SettleError, StakeTarget, UserBalance, UserId,
};
use rust_decimal::Decimal;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub commitment_id: CommitmentId,
    /// The balance as staged inside the transaction. The store assigns the
    /// final document `version` at commit time, so a subsequent read
    /// returns this balance with `version + 1`.
    pub updated_balance: UserBalance,
}

/// The commitment ledger. Holds the transactional store as an explicit
/// dependency; one instance serves all markets.
pub struct CommitmentLedger {
    store: Arc<DocumentStore>,
    config: EngineConfig,
}

impl CommitmentLedger {
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Stake `tokens` on `option_id` of `market_id` for `user_id`.
    ///
    /// Atomically, within a single store transaction:
    /// 1. Read the balance (zero-balance default if absent) and check funds.
    /// 2. Debit available, credit committed.
    /// 3. Read-before-write: does the user already hold an active
    ///    commitment here? Controls the participant counters.
    /// 4. Write the commitment with an odds/aggregate snapshot.
    /// 5. Update per-option and market aggregates, recompute percentages.
    ///
    /// # Errors
    /// - `ValidationError` for a non-positive or over-bound stake, or an
    ///   option that doesn't belong to the market
    /// - `MarketNotFound` / `MarketInactive` for a missing or non-active market
    /// - `InsufficientBalance` when available funds don't cover the stake
    /// - `TransactionFailed` when the conflict-retry budget is exhausted
    pub fn commit(
        &self,
        user_id: UserId,
        market_id: MarketId,
        option_id: &OptionId,
        tokens: u64,
    ) -> Result<CommitReceipt> {
        if tokens == 0 {
            return Err(SettleError::ValidationError {
                reason: "stake must be a positive token amount".into(),
            });
        }
        if tokens > self.config.max_tokens_per_commitment {
            return Err(SettleError::ValidationError {
                reason: format!(
                    "stake {tokens} exceeds the per-commitment bound {}",
                    self.config.max_tokens_per_commitment
                ),
            });
        }

        let (commitment_id, updated_balance) = self.store.run_transaction(market_id, |txn| {
            let mut market = txn.market(market_id)?;
            if market.status != MarketStatus::Active {
                return Err(SettleError::MarketInactive {
                    market_id,
                    status: market.status,
                    required: MarketStatus::Active,
                });
            }
            if !market.has_option(option_id) {
                return Err(SettleError::ValidationError {
                    reason: format!("market {market_id} has no option {option_id}"),
                });
            }

            // Step 1-2: balance check and move.
            let mut balance = txn.balance_or_default(user_id);
            if balance.available_tokens < tokens {
                return Err(SettleError::InsufficientBalance {
                    needed: tokens,
                    available: balance.available_tokens,
                });
            }
            balance.available_tokens -= tokens;
            balance.committed_tokens += tokens;

            // Step 3: participant counters only move on first active stake.
            let first_in_market = !txn.user_has_active_commitment(market_id, user_id);
            let first_on_option = !txn
                .commitments_for_market(market_id)
                .iter()
                .any(|c| c.user_id == user_id && c.is_active() && targets_option(&market, c, option_id));

            // Step 5 (computed before the snapshot so the snapshot reflects
            // the post-commit state): aggregates and percentages.
            {
                let option = market
                    .option_mut(option_id)
                    .ok_or_else(|| SettleError::Internal("option vanished mid-txn".into()))?;
                option.total_tokens += tokens;
                if first_on_option {
                    option.participant_count += 1;
                }
            }
            market.total_tokens_staked += tokens;
            if first_in_market {
                market.total_participants += 1;
            }
            market.updated_at = Utc::now();
            market.recompute_percentages();

            // Step 4: commitment with odds snapshot.
            let option_total_after = market
                .option(option_id)
                .map(|o| o.total_tokens)
                .unwrap_or_default();
            let odds = pool_odds(market.total_tokens_staked, option_total_after);
            let potential_winning = floor_mul_div(
                tokens,
                market.total_tokens_staked,
                option_total_after,
            );

            let commitment = Commitment {
                id: CommitmentId::new(),
                user_id,
                market_id,
                target: stake_target_for(&market, option_id),
                tokens_committed: tokens,
                odds_at_commitment: odds,
                potential_winning,
                status: CommitmentStatus::Active,
                snapshot: MarketSnapshot {
                    option_totals: market
                        .options
                        .iter()
                        .map(|o| (o.id.clone(), o.total_tokens, o.participant_count))
                        .collect(),
                    total_tokens_staked: market.total_tokens_staked,
                    total_participants: market.total_participants,
                },
                payout_amount: None,
                profit: None,
                created_at: Utc::now(),
                resolved_at: None,
            };
            let commitment_id = commitment.id;

            txn.put_commitment(commitment);
            txn.put_market(market);
            txn.put_balance(balance.clone());
            Ok((commitment_id, balance))
        })?;

        tracing::info!(
            user = %user_id,
            market = %market_id,
            option = %option_id,
            tokens,
            commitment = %commitment_id,
            "stake committed"
        );

        Ok(CommitReceipt {
            commitment_id,
            updated_balance,
        })
    }

    /// The store this ledger operates on.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }
}

/// Which scheme newly written commitments use: two-sided markets dual-write
/// `Hybrid` (explicit id + mapped side) so legacy readers keep working,
/// N-option markets write `Explicit`.
fn stake_target_for(market: &Market, option_id: &OptionId) -> StakeTarget {
    if market.is_two_sided() {
        let side = if market.options[0].id == *option_id {
            BinarySide::Yes
        } else {
            BinarySide::No
        };
        StakeTarget::Hybrid {
            option_id: option_id.clone(),
            side,
        }
    } else {
        StakeTarget::Explicit(option_id.clone())
    }
}

/// Whether an existing commitment targets `option_id` under either scheme.
fn targets_option(market: &Market, commitment: &Commitment, option_id: &OptionId) -> bool {
    if let Some(explicit) = commitment.target.explicit_option_id() {
        return explicit == option_id;
    }
    if let Some(side) = commitment.target.legacy_side() {
        return market
            .options
            .get(side.option_index())
            .is_some_and(|o| &o.id == option_id);
    }
    false
}

/// Pool odds: market pool / option pool, both post-commit.
fn pool_odds(market_total: u64, option_total: u64) -> Decimal {
    if option_total == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(market_total) / Decimal::from(option_total)).round_dp(4)
    }
}

/// `floor(stake × numerator / denominator)`, exact via u128.
#[allow(clippy::cast_possible_truncation)]
fn floor_mul_div(stake: u64, numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    (u128::from(stake) * u128::from(numerator) / u128::from(denominator)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_binary() -> (CommitmentLedger, MarketId, UserId) {
        let store = Arc::new(DocumentStore::new());
        let market = Market::dummy_binary();
        let market_id = market.id;
        store.insert_market(market).unwrap();
        let user = UserId::new();
        store.deposit(user, 10_000);
        (
            CommitmentLedger::new(store, EngineConfig::default()),
            market_id,
            user,
        )
    }

    #[test]
    fn commit_moves_balance_and_updates_market() {
        let (ledger, market_id, user) = setup_binary();
        let receipt = ledger
            .commit(user, market_id, &OptionId::from("yes"), 400)
            .unwrap();

        assert_eq!(receipt.updated_balance.available_tokens, 9_600);
        assert_eq!(receipt.updated_balance.committed_tokens, 400);

        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.total_tokens_staked, 400);
        assert_eq!(market.total_participants, 1);
        assert_eq!(market.options[0].total_tokens, 400);
        assert_eq!(market.options[0].participant_count, 1);
        assert_eq!(market.options[1].total_tokens, 0);
        assert!(market.aggregates_consistent());
        assert_eq!(market.options[0].percentage, Decimal::ONE_HUNDRED);

        let commitment = ledger.store().commitment(receipt.commitment_id).unwrap();
        assert_eq!(commitment.tokens_committed, 400);
        assert!(commitment.is_active());
    }

    #[test]
    fn receipt_balance_version_lags_committed_read_by_one() {
        let (ledger, market_id, user) = setup_binary();
        let receipt = ledger
            .commit(user, market_id, &OptionId::from("yes"), 100)
            .unwrap();

        // The store stamps the final version at commit; the receipt holds
        // the staged balance, one behind what a fresh read returns.
        let live = ledger.store().balance(user);
        assert_eq!(live.version, receipt.updated_balance.version + 1);
        assert_eq!(live.available_tokens, receipt.updated_balance.available_tokens);
        assert_eq!(live.committed_tokens, receipt.updated_balance.committed_tokens);
    }

    #[test]
    fn commit_conserves_total_supply() {
        let (ledger, market_id, user) = setup_binary();
        let before = ledger.store().total_supply();
        ledger
            .commit(user, market_id, &OptionId::from("no"), 250)
            .unwrap();
        assert_eq!(ledger.store().total_supply(), before);
    }

    #[test]
    fn insufficient_balance_mutates_nothing() {
        let (ledger, market_id, user) = setup_binary();
        let err = ledger
            .commit(user, market_id, &OptionId::from("yes"), 10_001)
            .unwrap_err();
        assert!(matches!(err, SettleError::InsufficientBalance { needed: 10_001, available: 10_000 }));

        let bal = ledger.store().balance(user);
        assert_eq!(bal.available_tokens, 10_000);
        assert_eq!(bal.committed_tokens, 0);
        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.total_tokens_staked, 0);
        assert!(ledger.store().commitments_for_market(market_id).is_empty());
    }

    #[test]
    fn zero_stake_rejected() {
        let (ledger, market_id, user) = setup_binary();
        let err = ledger
            .commit(user, market_id, &OptionId::from("yes"), 0)
            .unwrap_err();
        assert!(matches!(err, SettleError::ValidationError { .. }));
    }

    #[test]
    fn over_bound_stake_rejected() {
        let (ledger, market_id, user) = setup_binary();
        let max = EngineConfig::default().max_tokens_per_commitment;
        let err = ledger
            .commit(user, market_id, &OptionId::from("yes"), max + 1)
            .unwrap_err();
        assert!(matches!(err, SettleError::ValidationError { .. }));
    }

    #[test]
    fn unknown_option_rejected() {
        let (ledger, market_id, user) = setup_binary();
        let err = ledger
            .commit(user, market_id, &OptionId::from("maybe"), 10)
            .unwrap_err();
        assert!(matches!(err, SettleError::ValidationError { .. }));
    }

    #[test]
    fn missing_market_rejected() {
        let (ledger, _, user) = setup_binary();
        let ghost = MarketId::new();
        let err = ledger
            .commit(user, ghost, &OptionId::from("yes"), 10)
            .unwrap_err();
        assert!(matches!(err, SettleError::MarketNotFound(id) if id == ghost));
    }

    #[test]
    fn inactive_market_rejected() {
        let store = Arc::new(DocumentStore::new());
        let mut market = Market::dummy_binary();
        market.status = MarketStatus::PendingResolution;
        let market_id = market.id;
        store.insert_market(market).unwrap();
        let user = UserId::new();
        store.deposit(user, 100);
        let ledger = CommitmentLedger::new(store, EngineConfig::default());

        let err = ledger
            .commit(user, market_id, &OptionId::from("yes"), 10)
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::MarketInactive {
                status: MarketStatus::PendingResolution,
                ..
            }
        ));
    }

    #[test]
    fn repeat_commit_same_user_keeps_participant_count() {
        let (ledger, market_id, user) = setup_binary();
        ledger
            .commit(user, market_id, &OptionId::from("yes"), 100)
            .unwrap();
        ledger
            .commit(user, market_id, &OptionId::from("yes"), 200)
            .unwrap();

        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.total_participants, 1);
        assert_eq!(market.options[0].participant_count, 1);
        assert_eq!(market.options[0].total_tokens, 300);
    }

    #[test]
    fn same_user_new_option_bumps_option_counter_only() {
        let (ledger, market_id, user) = setup_binary();
        ledger
            .commit(user, market_id, &OptionId::from("yes"), 100)
            .unwrap();
        ledger
            .commit(user, market_id, &OptionId::from("no"), 100)
            .unwrap();

        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.total_participants, 1);
        assert_eq!(market.options[0].participant_count, 1);
        assert_eq!(market.options[1].participant_count, 1);
    }

    #[test]
    fn second_user_bumps_participants() {
        let (ledger, market_id, user_a) = setup_binary();
        let user_b = UserId::new();
        ledger.store().deposit(user_b, 1_000);

        ledger
            .commit(user_a, market_id, &OptionId::from("yes"), 100)
            .unwrap();
        ledger
            .commit(user_b, market_id, &OptionId::from("no"), 100)
            .unwrap();

        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.total_participants, 2);
    }

    #[test]
    fn two_sided_market_writes_hybrid_target() {
        let (ledger, market_id, user) = setup_binary();
        let receipt = ledger
            .commit(user, market_id, &OptionId::from("no"), 50)
            .unwrap();
        let commitment = ledger.store().commitment(receipt.commitment_id).unwrap();
        assert_eq!(
            commitment.target,
            StakeTarget::Hybrid {
                option_id: OptionId::from("no"),
                side: BinarySide::No,
            }
        );
    }

    #[test]
    fn n_option_market_writes_explicit_target() {
        let store = Arc::new(DocumentStore::new());
        let market = Market::dummy_n_options(3);
        let market_id = market.id;
        store.insert_market(market).unwrap();
        let user = UserId::new();
        store.deposit(user, 1_000);
        let ledger = CommitmentLedger::new(store, EngineConfig::default());

        let receipt = ledger
            .commit(user, market_id, &OptionId::from("opt-2"), 75)
            .unwrap();
        let commitment = ledger.store().commitment(receipt.commitment_id).unwrap();
        assert_eq!(
            commitment.target,
            StakeTarget::Explicit(OptionId::from("opt-2"))
        );
    }

    #[test]
    fn snapshot_reflects_post_commit_state() {
        let (ledger, market_id, user) = setup_binary();
        let receipt = ledger
            .commit(user, market_id, &OptionId::from("yes"), 300)
            .unwrap();
        let commitment = ledger.store().commitment(receipt.commitment_id).unwrap();
        assert_eq!(commitment.snapshot.total_tokens_staked, 300);
        assert_eq!(commitment.snapshot.total_participants, 1);
        assert_eq!(
            commitment.snapshot.option_totals[0],
            (OptionId::from("yes"), 300, 1)
        );
    }

    #[test]
    fn odds_and_potential_winning() {
        let (ledger, market_id, user_a) = setup_binary();
        let user_b = UserId::new();
        ledger.store().deposit(user_b, 1_000);

        ledger
            .commit(user_a, market_id, &OptionId::from("yes"), 300)
            .unwrap();
        // Market pool 400, "no" pool 100 → odds 4.0, potential 4 × 100.
        let receipt = ledger
            .commit(user_b, market_id, &OptionId::from("no"), 100)
            .unwrap();
        let commitment = ledger.store().commitment(receipt.commitment_id).unwrap();
        assert_eq!(commitment.odds_at_commitment, Decimal::from(4));
        assert_eq!(commitment.potential_winning, 400);
    }

    #[test]
    fn percentages_after_mixed_commits() {
        let (ledger, market_id, user) = setup_binary();
        ledger
            .commit(user, market_id, &OptionId::from("yes"), 300)
            .unwrap();
        ledger
            .commit(user, market_id, &OptionId::from("no"), 100)
            .unwrap();

        let market = ledger.store().market(market_id).unwrap();
        assert_eq!(market.options[0].percentage, Decimal::from(75));
        assert_eq!(market.options[1].percentage, Decimal::from(25));
    }
}
