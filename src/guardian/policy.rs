//! Threshold policy
//!
//! Maps a balance snapshot to a per-asset "below floor" classification.
//! A balance strictly below its floor counts as below; a zero balance is
//! always below a positive floor.

use super::types::{AssetKind, BalanceSnapshot, CompromiseVerdict, ThresholdConfig};

/// Result of classifying one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub native_below: bool,
    pub token_below: bool,
}

impl Classification {
    pub fn is_below(&self, asset: AssetKind) -> bool {
        match asset {
            AssetKind::Native => self.native_below,
            AssetKind::Token => self.token_below,
        }
    }

    /// Both assets below their floors
    pub fn is_critical(&self) -> bool {
        self.native_below && self.token_below
    }

    /// Neither asset below its floor
    pub fn is_healthy(&self) -> bool {
        !self.native_below && !self.token_below
    }
}

/// Stateless threshold policy
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    /// Classify a snapshot against the configured floors
    pub fn classify(snapshot: &BalanceSnapshot, config: &ThresholdConfig) -> Classification {
        Classification {
            native_below: snapshot.native_balance < config.native_floor,
            token_below: snapshot.token_balance < config.token_floor,
        }
    }

    /// Per-asset verdicts, for reporting
    pub fn verdicts(snapshot: &BalanceSnapshot, config: &ThresholdConfig) -> [CompromiseVerdict; 2] {
        AssetKind::ALL.map(|asset| {
            let balance = snapshot.balance_of(asset);
            CompromiseVerdict {
                asset,
                below_floor: balance < config.floor_of(asset),
                balance,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use chrono::Utc;

    fn floors(native: u64, token: u64) -> ThresholdConfig {
        ThresholdConfig {
            native_floor: U256::from(native),
            token_floor: U256::from(token),
        }
    }

    fn snapshot(native: u64, token: u64) -> BalanceSnapshot {
        BalanceSnapshot::new(U256::from(native), U256::from(token), Utc::now())
    }

    #[test]
    fn test_healthy_snapshot() {
        let c = ThresholdPolicy::classify(&snapshot(10, 10), &floors(5, 5));
        assert!(c.is_healthy());
        assert!(!c.is_critical());
    }

    #[test]
    fn test_floor_is_not_below() {
        let c = ThresholdPolicy::classify(&snapshot(5, 5), &floors(5, 5));
        assert!(c.is_healthy());
    }

    #[test]
    fn test_single_asset_below() {
        let c = ThresholdPolicy::classify(&snapshot(2, 10), &floors(5, 5));
        assert!(c.native_below);
        assert!(!c.token_below);
        assert!(c.is_below(AssetKind::Native));
    }

    #[test]
    fn test_zero_balance_below_positive_floor() {
        let c = ThresholdPolicy::classify(&snapshot(0, 0), &floors(1, 1));
        assert!(c.is_critical());
    }

    #[test]
    fn test_large_balances() {
        let config = ThresholdConfig {
            native_floor: U256::MAX,
            token_floor: U256::from(1u64),
        };
        let snap = BalanceSnapshot::new(U256::MAX - U256::from(1u64), U256::MAX, Utc::now());
        let c = ThresholdPolicy::classify(&snap, &config);
        assert!(c.native_below);
        assert!(!c.token_below);
    }

    #[test]
    fn test_verdicts_carry_balances() {
        let [native, token] = ThresholdPolicy::verdicts(&snapshot(2, 3), &floors(5, 1));
        assert_eq!(native.asset, AssetKind::Native);
        assert!(native.below_floor);
        assert_eq!(native.balance, U256::from(2u64));
        assert_eq!(token.asset, AssetKind::Token);
        assert!(!token.below_floor);
    }
}
