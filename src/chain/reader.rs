//! Balance reads
//!
//! [`ChainReader`] is the port the monitor polls every tick. The JSON-RPC
//! implementation talks to any Ethereum node (`eth_getBalance`, `eth_call`).

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::erc20;
use super::rpc::JsonRpcClient;
use crate::error::{Error, Result};

/// Reads native-coin and token balances
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Native balance of `account`, in wei
    async fn native_balance(&self, account: Address) -> Result<U256>;

    /// ERC-20 balance of `account` on `token`, in base units
    async fn token_balance(&self, token: Address, account: Address) -> Result<U256>;
}

/// Chain reader backed by a node's JSON-RPC endpoint
pub struct JsonRpcChainReader {
    rpc: JsonRpcClient,
}

impl JsonRpcChainReader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(endpoint, timeout)?,
        })
    }

    /// Current chain id, used as a connectivity check
    pub async fn chain_id(&self) -> Result<u64> {
        let id: U256 = self
            .rpc
            .call("eth_chainId", json!([]))
            .await
            .map_err(|e| Error::ReadFailure(Error::from(e).to_string()))?;

        u64::try_from(id).map_err(|_| Error::ReadFailure(format!("Chain id out of range: {}", id)))
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn native_balance(&self, account: Address) -> Result<U256> {
        debug!(%account, "Reading native balance");

        self.rpc
            .call("eth_getBalance", json!([account, "latest"]))
            .await
            .map_err(|e| Error::ReadFailure(format!("eth_getBalance({}): {}", account, Error::from(e))))
    }

    async fn token_balance(&self, token: Address, account: Address) -> Result<U256> {
        debug!(%token, %account, "Reading token balance");

        let call = json!({
            "to": token,
            "data": erc20::balance_of_calldata(account),
        });

        let data: Bytes = self
            .rpc
            .call("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| Error::ReadFailure(format!("balanceOf({}) on {}: {}", account, token, Error::from(e))))?;

        erc20::decode_balance_of(&data)
            .map_err(|e| Error::ReadFailure(format!("balanceOf({}) on {}: {}", account, token, e)))
    }
}
