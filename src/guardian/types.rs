//! Core types for the monitor-decide-rescue engine
//!
//! Balance snapshots, floors, verdicts and per-asset rescue bookkeeping.

use alloy_primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset classes the guardian protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Chain native coin (ETH)
    Native,

    /// The single configured fungible token (ERC-20)
    Token,
}

impl AssetKind {
    /// Both assets, in evaluation order
    pub const ALL: [AssetKind; 2] = [AssetKind::Native, AssetKind::Token];
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token => write!(f, "token"),
        }
    }
}

/// Balances of the protected account at one instant. Produced fresh each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub native_balance: U256,
    pub token_balance: U256,
    pub observed_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(native_balance: U256, token_balance: U256, observed_at: DateTime<Utc>) -> Self {
        Self {
            native_balance,
            token_balance,
            observed_at,
        }
    }

    /// Observed balance of one asset
    pub fn balance_of(&self, asset: AssetKind) -> U256 {
        match asset {
            AssetKind::Native => self.native_balance,
            AssetKind::Token => self.token_balance,
        }
    }
}

/// Per-asset floors, in base units (wei / token smallest unit).
///
/// Both floors are expected to be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub native_floor: U256,
    pub token_floor: U256,
}

impl ThresholdConfig {
    pub fn floor_of(&self, asset: AssetKind) -> U256 {
        match asset {
            AssetKind::Native => self.native_floor,
            AssetKind::Token => self.token_floor,
        }
    }
}

/// Classification of one asset for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompromiseVerdict {
    pub asset: AssetKind,
    pub below_floor: bool,
    pub balance: U256,
}

/// Receipt of a confirmed delegated transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Relayer-side intent hash (user operation hash)
    pub intent_hash: B256,
    /// On-chain transaction hash
    pub tx_hash: B256,
}

/// Outcome of the last finished rescue attempt for an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescueOutcome {
    Success { tx_hash: B256 },
    Failure { reason: String },
}

impl RescueOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RescueOutcome::Success { .. })
    }
}

/// Rescue bookkeeping for one asset. Owned exclusively by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RescueState {
    /// True only while exactly one executor call for this asset is outstanding
    pub in_flight: bool,
    /// Id of the outstanding attempt, if any
    pub attempt_id: Option<Uuid>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RescueOutcome>,
    /// Set when the relayer reports the grant as unusable; the asset's
    /// rescue path stays closed for the rest of the session.
    pub disabled: Option<String>,
}

/// Last known balances for display
#[derive(Debug, Clone, Default)]
pub struct BalanceBoard {
    pub protected_native: Option<U256>,
    pub protected_token: Option<U256>,
    pub safe_native: Option<U256>,
    pub safe_token: Option<U256>,
    pub updated_at: Option<DateTime<Utc>>,
}
