//! Engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Configuration for the settlement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tokens a single commitment may stake.
    pub max_tokens_per_commitment: u64,
    /// Fixed platform fee rate applied to every resolved pool.
    pub house_fee_rate: Decimal,
    /// Inclusive lower bound for the per-market creator fee rate.
    pub min_creator_fee_rate: Decimal,
    /// Inclusive upper bound for the per-market creator fee rate.
    pub max_creator_fee_rate: Decimal,
    /// Transaction retry budget on write conflict.
    pub max_txn_retries: u32,
}

impl EngineConfig {
    /// Whether `rate` is an acceptable creator fee rate.
    #[must_use]
    pub fn creator_fee_in_bounds(&self, rate: Decimal) -> bool {
        rate >= self.min_creator_fee_rate && rate <= self.max_creator_fee_rate
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_commitment: constants::DEFAULT_MAX_TOKENS_PER_COMMITMENT,
            house_fee_rate: Decimal::new(i64::from(constants::HOUSE_FEE_BPS), 4),
            min_creator_fee_rate: Decimal::new(i64::from(constants::MIN_CREATOR_FEE_BPS), 4),
            max_creator_fee_rate: Decimal::new(i64::from(constants::MAX_CREATOR_FEE_BPS), 4),
            max_txn_retries: constants::MAX_TXN_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.house_fee_rate, Decimal::new(5, 2)); // 0.05
        assert_eq!(cfg.min_creator_fee_rate, Decimal::new(1, 2)); // 0.01
        assert_eq!(cfg.max_creator_fee_rate, Decimal::new(5, 2)); // 0.05
    }

    #[test]
    fn creator_fee_bounds() {
        let cfg = EngineConfig::default();
        assert!(cfg.creator_fee_in_bounds(Decimal::new(1, 2)));
        assert!(cfg.creator_fee_in_bounds(Decimal::new(2, 2)));
        assert!(cfg.creator_fee_in_bounds(Decimal::new(5, 2)));
        assert!(!cfg.creator_fee_in_bounds(Decimal::new(5, 3))); // 0.005
        assert!(!cfg.creator_fee_in_bounds(Decimal::new(6, 2))); // 0.06
        assert!(!cfg.creator_fee_in_bounds(Decimal::ZERO));
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
