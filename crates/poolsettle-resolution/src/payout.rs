//! Pure, deterministic payout calculation.
//!
//! Given a market, its commitments, a winning option and a creator fee
//! rate, [`calculate`] produces the complete [`PayoutPlan`]: fee split,
//! per-commitment payouts, per-user totals, classification summary, and a
//! self-verification block. No state is read or written.
//!
//! All token amounts are integer with floor rounding; the floor loss from
//! winner shares stays in the plan as `rounding_remainder` and is always
//! strictly less than the winner count.
//!
//! Duplicate commitment IDs fail fast with `DuplicateCommitment` instead
//! of being paid twice and merely flagged, as the legacy system did.

use std::collections::{BTreeMap, HashSet};

use poolsettle_types::{
    ClassificationSummary, Commitment, CommitmentId, CommitmentPayout, Market, OptionId,
    PayoutClassification, PayoutPlan, Result, SettleError, StakeTarget, UserPayoutTotal,
    VerificationBlock, constants,
};
use rust_decimal::{Decimal, prelude::ToPrimitive};

/// Resolve a commitment's stake target to its canonical option ID.
///
/// This is the single derivation point for the legacy/generic scheme
/// duality:
/// - `Explicit` uses the stored option ID (must belong to the market).
/// - `Legacy` maps the side label positionally, valid only on two-option
///   markets.
/// - `Hybrid` carries both; the mapped side must agree with the explicit ID.
///
/// # Errors
/// Returns `UnresolvableCommitment` when the target cannot be mapped onto
/// the market's options.
pub fn effective_option(
    market: &Market,
    commitment: &Commitment,
) -> Result<(OptionId, PayoutClassification)> {
    let unresolvable = |reason: String| SettleError::UnresolvableCommitment {
        commitment_id: commitment.id,
        reason,
    };

    match &commitment.target {
        StakeTarget::Explicit(option_id) => {
            if market.has_option(option_id) {
                Ok((option_id.clone(), PayoutClassification::Explicit))
            } else {
                Err(unresolvable(format!(
                    "explicit option {option_id} does not belong to market {}",
                    market.id
                )))
            }
        }
        StakeTarget::Legacy(side) => {
            if !market.is_two_sided() {
                return Err(unresolvable(format!(
                    "legacy side {side} on a {}-option market",
                    market.options.len()
                )));
            }
            Ok((
                market.options[side.option_index()].id.clone(),
                PayoutClassification::LegacyDerived,
            ))
        }
        StakeTarget::Hybrid { option_id, side } => {
            if !market.is_two_sided() {
                return Err(unresolvable(format!(
                    "hybrid target with side {side} on a {}-option market",
                    market.options.len()
                )));
            }
            let mapped = &market.options[side.option_index()].id;
            if mapped == option_id {
                Ok((option_id.clone(), PayoutClassification::Hybrid))
            } else {
                Err(unresolvable(format!(
                    "hybrid disagreement: side {side} maps to {mapped}, explicit is {option_id}"
                )))
            }
        }
    }
}

/// Compute the full payout plan for resolving `market` with
/// `winning_option_id` at `creator_fee_rate`.
///
/// Pure and deterministic: identical inputs always yield an identical plan.
///
/// # Errors
/// - `ValidationError` when the creator fee rate is outside its bounds
/// - `InvalidWinningOption` when the option doesn't belong to the market
/// - `DuplicateCommitment` on a repeated commitment ID (fail-fast policy)
/// - `UnresolvableCommitment` when a stake target cannot be derived
pub fn calculate(
    market: &Market,
    commitments: &[Commitment],
    winning_option_id: &OptionId,
    creator_fee_rate: Decimal,
) -> Result<PayoutPlan> {
    let min_rate = Decimal::new(i64::from(constants::MIN_CREATOR_FEE_BPS), 4);
    let max_rate = Decimal::new(i64::from(constants::MAX_CREATOR_FEE_BPS), 4);
    if creator_fee_rate < min_rate || creator_fee_rate > max_rate {
        return Err(SettleError::ValidationError {
            reason: format!(
                "creator fee rate {creator_fee_rate} outside [{min_rate}, {max_rate}]"
            ),
        });
    }
    if !market.has_option(winning_option_id) {
        return Err(SettleError::InvalidWinningOption {
            market_id: market.id,
            option_id: winning_option_id.clone(),
        });
    }

    // Fail fast on duplicates rather than double-paying.
    let mut seen: HashSet<CommitmentId> = HashSet::with_capacity(commitments.len());
    for commitment in commitments {
        if !seen.insert(commitment.id) {
            return Err(SettleError::DuplicateCommitment(commitment.id));
        }
    }

    // Derive every effective option up front; any unresolvable record
    // aborts the whole computation.
    let mut derived = Vec::with_capacity(commitments.len());
    for commitment in commitments {
        let (option_id, classification) = effective_option(market, commitment)?;
        derived.push((commitment, option_id, classification));
    }

    let total_pool: u64 = commitments.iter().map(|c| c.tokens_committed).sum();
    let house_fee = total_pool * u64::from(constants::HOUSE_FEE_BPS) / 10_000;
    let creator_fee = (Decimal::from(total_pool) * creator_fee_rate)
        .floor()
        .to_u64()
        .ok_or_else(|| SettleError::Internal("creator fee out of u64 range".into()))?;
    let winner_pool = total_pool - house_fee - creator_fee;

    let total_winning_tokens: u64 = derived
        .iter()
        .filter(|(_, option_id, _)| option_id == winning_option_id)
        .map(|(c, _, _)| c.tokens_committed)
        .sum();

    let mut payouts = Vec::with_capacity(derived.len());
    let mut user_totals: BTreeMap<_, UserPayoutTotal> = BTreeMap::new();
    let mut classification_summary = ClassificationSummary::default();

    for (commitment, option_id, classification) in derived {
        let is_winner = &option_id == winning_option_id;
        let (win_share, payout_amount) = if is_winner {
            (
                (Decimal::from(commitment.tokens_committed)
                    / Decimal::from(total_winning_tokens))
                .round_dp(6),
                floor_share(commitment.tokens_committed, winner_pool, total_winning_tokens),
            )
        } else {
            (Decimal::ZERO, 0)
        };
        #[allow(clippy::cast_possible_wrap)]
        let profit = payout_amount as i64 - commitment.tokens_committed as i64;

        classification_summary.record(classification);
        let totals = user_totals.entry(commitment.user_id).or_default();
        totals.tokens_staked += commitment.tokens_committed;
        totals.payout_amount += payout_amount;

        payouts.push(CommitmentPayout {
            commitment_id: commitment.id,
            user_id: commitment.user_id,
            effective_option_id: option_id,
            classification,
            is_winner,
            tokens_staked: commitment.tokens_committed,
            win_share,
            payout_amount,
            profit,
        });
    }

    let total_paid: u64 = payouts.iter().map(|p| p.payout_amount).sum();
    let winner_count = payouts.iter().filter(|p| p.is_winner).count();
    let (rounding_remainder, unclaimed_pool) = if winner_count == 0 {
        // Nobody matched the winning option: the whole winner pool stays
        // with the platform as float.
        (0, winner_pool)
    } else {
        (winner_pool - total_paid, 0)
    };

    let verification = VerificationBlock {
        all_commitments_processed: payouts.len() == commitments.len(),
        no_double_payouts: true, // guaranteed by the fail-fast guard above
        payout_sums_correct: total_paid <= winner_pool
            && (winner_count == 0 || rounding_remainder < winner_count as u64),
        audit_trail_complete: classification_summary.total() == payouts.len(),
    };

    Ok(PayoutPlan {
        market_id: market.id,
        winning_option_id: winning_option_id.clone(),
        total_pool,
        house_fee,
        creator_fee,
        winner_pool,
        total_winning_tokens,
        unclaimed_pool,
        rounding_remainder,
        payouts,
        user_totals,
        classification_summary,
        verification,
    })
}

/// `floor(stake × winner_pool / total_winning)`, exact via u128.
#[allow(clippy::cast_possible_truncation)]
fn floor_share(stake: u64, winner_pool: u64, total_winning: u64) -> u64 {
    if total_winning == 0 {
        return 0;
    }
    (u128::from(stake) * u128::from(winner_pool) / u128::from(total_winning)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolsettle_types::{BinarySide, UserId};

    fn fee(pct: i64) -> Decimal {
        Decimal::new(pct, 2)
    }

    /// The worked example: 100/200 on the winner, 150/250 on the loser,
    /// creator fee 2%.
    fn worked_example() -> (Market, Vec<Commitment>) {
        let market = Market::dummy_binary();
        let commitments = vec![
            Commitment::dummy_on(&market, UserId::new(), "yes", 100),
            Commitment::dummy_on(&market, UserId::new(), "yes", 200),
            Commitment::dummy_on(&market, UserId::new(), "no", 150),
            Commitment::dummy_on(&market, UserId::new(), "no", 250),
        ];
        (market, commitments)
    }

    #[test]
    fn worked_example_amounts() {
        let (market, commitments) = worked_example();
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap();

        assert_eq!(plan.total_pool, 700);
        assert_eq!(plan.house_fee, 35);
        assert_eq!(plan.creator_fee, 14);
        assert_eq!(plan.winner_pool, 651);
        assert_eq!(plan.total_winning_tokens, 300);

        let winners: Vec<_> = plan.payouts.iter().filter(|p| p.is_winner).collect();
        assert_eq!(winners.len(), 2);
        assert_eq!(winners[0].payout_amount + winners[1].payout_amount, 651);
        let by_stake = |s: u64| winners.iter().find(|p| p.tokens_staked == s).unwrap();
        assert_eq!(by_stake(100).payout_amount, 217);
        assert_eq!(by_stake(200).payout_amount, 434);
        assert_eq!(by_stake(100).profit, 117);

        for loser in plan.payouts.iter().filter(|p| !p.is_winner) {
            assert_eq!(loser.payout_amount, 0);
            assert_eq!(loser.profit, -i64::try_from(loser.tokens_staked).unwrap());
        }
        assert!(plan.verification.passed());
    }

    #[test]
    fn conservation_property() {
        let (market, commitments) = worked_example();
        for rate in [fee(1), fee(2), fee(3), fee(5)] {
            let plan =
                calculate(&market, &commitments, &OptionId::from("no"), rate).unwrap();
            assert_eq!(
                plan.house_fee
                    + plan.creator_fee
                    + plan.total_paid_out()
                    + plan.rounding_remainder
                    + plan.unclaimed_pool,
                plan.total_pool
            );
            assert!(plan.rounding_remainder < plan.winner_count() as u64 + 1);
        }
    }

    #[test]
    fn winner_identification_property() {
        let (market, commitments) = worked_example();
        let winning = OptionId::from("yes");
        let plan = calculate(&market, &commitments, &winning, fee(2)).unwrap();
        for payout in &plan.payouts {
            assert_eq!(payout.is_winner, payout.effective_option_id == winning);
        }
    }

    #[test]
    fn determinism() {
        let (market, commitments) = worked_example();
        let a = calculate(&market, &commitments, &OptionId::from("yes"), fee(3)).unwrap();
        let b = calculate(&market, &commitments, &OptionId::from("yes"), fee(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input() {
        let market = Market::dummy_binary();
        let plan = calculate(&market, &[], &OptionId::from("yes"), fee(2)).unwrap();
        assert_eq!(plan.total_pool, 0);
        assert_eq!(plan.winner_pool, 0);
        assert_eq!(plan.winner_count(), 0);
        assert!(plan.payouts.is_empty());
        assert!(plan.user_totals.is_empty());
        assert!(plan.verification.passed());
    }

    #[test]
    fn zero_winners_retains_pool_as_float() {
        let market = Market::dummy_binary();
        let commitments = vec![
            Commitment::dummy_on(&market, UserId::new(), "no", 400),
            Commitment::dummy_on(&market, UserId::new(), "no", 600),
        ];
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap();
        assert_eq!(plan.total_pool, 1000);
        assert_eq!(plan.winner_count(), 0);
        assert_eq!(plan.total_paid_out(), 0);
        assert_eq!(plan.unclaimed_pool, plan.winner_pool);
        assert_eq!(plan.rounding_remainder, 0);
        assert!(plan.verification.passed());
    }

    #[test]
    fn creator_fee_bounds_enforced() {
        let (market, commitments) = worked_example();
        for bad in [Decimal::ZERO, Decimal::new(5, 3), Decimal::new(6, 2)] {
            let err =
                calculate(&market, &commitments, &OptionId::from("yes"), bad).unwrap_err();
            assert!(matches!(err, SettleError::ValidationError { .. }), "{bad}");
        }
    }

    #[test]
    fn invalid_winning_option_rejected() {
        let (market, commitments) = worked_example();
        let err =
            calculate(&market, &commitments, &OptionId::from("maybe"), fee(2)).unwrap_err();
        assert!(matches!(err, SettleError::InvalidWinningOption { .. }));
    }

    #[test]
    fn duplicate_commitments_fail_fast() {
        let (market, mut commitments) = worked_example();
        let dup = commitments[0].clone();
        commitments.push(dup);
        let err =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap_err();
        assert!(
            matches!(err, SettleError::DuplicateCommitment(id) if id == commitments[0].id)
        );
    }

    #[test]
    fn legacy_side_maps_positionally() {
        let market = Market::dummy_binary();
        let commitments = vec![
            Commitment::dummy(
                UserId::new(),
                market.id,
                StakeTarget::Legacy(BinarySide::Yes),
                100,
            ),
            Commitment::dummy(
                UserId::new(),
                market.id,
                StakeTarget::Legacy(BinarySide::No),
                100,
            ),
        ];
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap();
        assert_eq!(plan.classification_summary.legacy_derived, 2);
        assert!(plan.payouts[0].is_winner);
        assert!(!plan.payouts[1].is_winner);
    }

    #[test]
    fn hybrid_counts_when_agreeing() {
        let market = Market::dummy_binary();
        let commitments = vec![Commitment::dummy(
            UserId::new(),
            market.id,
            StakeTarget::Hybrid {
                option_id: OptionId::from("no"),
                side: BinarySide::No,
            },
            100,
        )];
        let plan =
            calculate(&market, &commitments, &OptionId::from("no"), fee(2)).unwrap();
        assert_eq!(plan.classification_summary.hybrid, 1);
        assert!(plan.payouts[0].is_winner);
    }

    #[test]
    fn hybrid_disagreement_is_unresolvable() {
        let market = Market::dummy_binary();
        let commitments = vec![Commitment::dummy(
            UserId::new(),
            market.id,
            StakeTarget::Hybrid {
                option_id: OptionId::from("no"),
                side: BinarySide::Yes,
            },
            100,
        )];
        let err =
            calculate(&market, &commitments, &OptionId::from("no"), fee(2)).unwrap_err();
        assert!(matches!(err, SettleError::UnresolvableCommitment { .. }));
    }

    #[test]
    fn legacy_side_invalid_on_n_option_market() {
        let market = Market::dummy_n_options(3);
        let commitments = vec![Commitment::dummy(
            UserId::new(),
            market.id,
            StakeTarget::Legacy(BinarySide::Yes),
            100,
        )];
        let err =
            calculate(&market, &commitments, &OptionId::from("opt-0"), fee(2)).unwrap_err();
        assert!(matches!(err, SettleError::UnresolvableCommitment { .. }));
    }

    #[test]
    fn explicit_foreign_option_is_unresolvable() {
        let market = Market::dummy_binary();
        let commitments = vec![Commitment::dummy(
            UserId::new(),
            market.id,
            StakeTarget::Explicit(OptionId::from("elsewhere")),
            100,
        )];
        let err =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap_err();
        assert!(matches!(err, SettleError::UnresolvableCommitment { .. }));
    }

    #[test]
    fn user_totals_aggregate_across_options() {
        let market = Market::dummy_binary();
        let user = UserId::new();
        let commitments = vec![
            Commitment::dummy_on(&market, user, "yes", 100),
            Commitment::dummy_on(&market, user, "no", 50),
            Commitment::dummy_on(&market, UserId::new(), "yes", 100),
        ];
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(2)).unwrap();

        let totals = plan.user_totals.get(&user).unwrap();
        assert_eq!(totals.tokens_staked, 150);
        // 250 pool → house 12, creator 5, winner pool 233 over 200 winning
        // tokens → the user's 100-token winner pays 116.
        assert_eq!(totals.payout_amount, 116);
        assert_eq!(plan.user_totals.len(), 2);
    }

    #[test]
    fn heavy_fees_can_make_profit_negative() {
        let market = Market::dummy_binary();
        // Lone winner against a tiny losing side: fees exceed the gain.
        let commitments = vec![
            Commitment::dummy_on(&market, UserId::new(), "yes", 1_000),
            Commitment::dummy_on(&market, UserId::new(), "no", 10),
        ];
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(5)).unwrap();
        let winner = plan.payouts.iter().find(|p| p.is_winner).unwrap();
        assert!(winner.profit < 0, "profit = {}", winner.profit);
    }

    #[test]
    fn rounding_remainder_bounded_by_winner_count() {
        let market = Market::dummy_binary();
        let commitments = vec![
            Commitment::dummy_on(&market, UserId::new(), "yes", 7),
            Commitment::dummy_on(&market, UserId::new(), "yes", 11),
            Commitment::dummy_on(&market, UserId::new(), "yes", 13),
            Commitment::dummy_on(&market, UserId::new(), "no", 101),
        ];
        let plan =
            calculate(&market, &commitments, &OptionId::from("yes"), fee(3)).unwrap();
        assert!(plan.rounding_remainder < 3);
        assert_eq!(
            plan.total_paid_out() + plan.rounding_remainder,
            plan.winner_pool
        );
    }
}
