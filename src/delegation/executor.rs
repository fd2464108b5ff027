//! Delegated execution port
//!
//! A [`DelegatedExecutor`] moves funds out of the protected account on the
//! strength of a [`PermissionGrant`] alone: no signature from the account
//! owner is needed at rescue time.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::grant::PermissionGrant;
use crate::chain::erc20;
use crate::error::Result;
use crate::guardian::types::{AssetKind, TransactionReceipt};

/// Builds, submits and confirms delegated transfers.
///
/// Implementations must tolerate concurrent calls for different assets.
/// Callers never issue two concurrent calls for the same asset.
#[async_trait]
pub trait DelegatedExecutor: Send + Sync {
    /// Transfer `amount` of `asset` to `destination`, returning once the
    /// transfer is confirmed on-chain.
    async fn execute(
        &self,
        grant: &PermissionGrant,
        destination: Address,
        asset: AssetKind,
        amount: U256,
    ) -> Result<TransactionReceipt>;
}

/// One call executed through the delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub permissions_context: Bytes,
    pub delegation_manager: Address,
}

/// A fully built rescue intent for one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueIntent {
    pub asset: AssetKind,
    pub amount: U256,
    pub destination: Address,
    /// Session account that redeems the delegation
    pub sender: Option<Address>,
    pub call: DelegatedCall,
}

impl RescueIntent {
    /// Build the call for sweeping `amount` of `asset` to `destination`.
    ///
    /// Native transfers send value straight to the destination; token
    /// transfers call `transfer(destination, amount)` on `token`.
    pub fn build(
        grant: &PermissionGrant,
        destination: Address,
        asset: AssetKind,
        amount: U256,
        token: Address,
    ) -> Result<Self> {
        let delegation = grant.delegation()?;

        let (to, value, data) = match asset {
            AssetKind::Native => (destination, amount, Bytes::new()),
            AssetKind::Token => (token, U256::ZERO, erc20::transfer_calldata(destination, amount)),
        };

        Ok(Self {
            asset,
            amount,
            destination,
            sender: grant.signer,
            call: DelegatedCall {
                to,
                value,
                data,
                permissions_context: delegation.context.clone(),
                delegation_manager: delegation.delegation_manager,
            },
        })
    }
}

/// Executor that builds the intent, logs it and confirms nothing.
///
/// Used for `--dry-run` rehearsals.
pub struct DryRunExecutor {
    token: Address,
}

impl DryRunExecutor {
    pub fn new(token: Address) -> Self {
        Self { token }
    }
}

#[async_trait]
impl DelegatedExecutor for DryRunExecutor {
    async fn execute(
        &self,
        grant: &PermissionGrant,
        destination: Address,
        asset: AssetKind,
        amount: U256,
    ) -> Result<TransactionReceipt> {
        let intent = RescueIntent::build(grant, destination, asset, amount, self.token)?;

        warn!(
            asset = %asset,
            amount = %amount,
            to = %intent.call.to,
            value = %intent.call.value,
            "[DRY RUN] Would submit delegated rescue"
        );

        let receipt = TransactionReceipt {
            intent_hash: B256::ZERO,
            tx_hash: B256::ZERO,
        };
        info!("[DRY RUN] Rescue of {} {} simulated", amount, asset);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::grant::tests::valid_grant;
    use crate::error::Error;

    #[test]
    fn test_native_intent_sends_value() {
        let grant = valid_grant(AssetKind::Native);
        let destination = Address::repeat_byte(0xaa);
        let token = Address::repeat_byte(0xbb);

        let intent =
            RescueIntent::build(&grant, destination, AssetKind::Native, U256::from(2u64), token).unwrap();

        assert_eq!(intent.call.to, destination);
        assert_eq!(intent.call.value, U256::from(2u64));
        assert!(intent.call.data.is_empty());
        assert_eq!(intent.call.delegation_manager, Address::repeat_byte(0x22));
        assert_eq!(intent.sender, Some(Address::repeat_byte(0x11)));
    }

    #[test]
    fn test_token_intent_calls_transfer() {
        let grant = valid_grant(AssetKind::Token);
        let destination = Address::repeat_byte(0xaa);
        let token = Address::repeat_byte(0xbb);

        let intent =
            RescueIntent::build(&grant, destination, AssetKind::Token, U256::from(10u64), token).unwrap();

        assert_eq!(intent.call.to, token);
        assert_eq!(intent.call.value, U256::ZERO);
        assert_eq!(intent.call.data, erc20::transfer_calldata(destination, U256::from(10u64)));
    }

    #[test]
    fn test_intent_requires_delegation_fields() {
        let mut grant = valid_grant(AssetKind::Native);
        grant.signer_meta = None;

        let result = RescueIntent::build(
            &grant,
            Address::ZERO,
            AssetKind::Native,
            U256::from(1u64),
            Address::ZERO,
        );
        assert!(matches!(result, Err(Error::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_dry_run_returns_receipt() {
        let executor = DryRunExecutor::new(Address::repeat_byte(0xbb));
        let grant = valid_grant(AssetKind::Token);

        let receipt = executor
            .execute(&grant, Address::repeat_byte(0xaa), AssetKind::Token, U256::from(5u64))
            .await
            .unwrap();
        assert_eq!(receipt.tx_hash, B256::ZERO);
    }
}
