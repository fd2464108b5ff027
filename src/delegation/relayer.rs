//! Relayer-backed delegated executor
//!
//! Submits rescue intents to an ERC-4337 bundler that hosts the session
//! account, then waits for the user operation receipt:
//!
//! 1. fetch user-operation gas prices and take the `fast` tier
//! 2. submit the delegated call (retrying only transient transport faults)
//! 3. poll `eth_getUserOperationReceipt` until mined or the wait expires

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::executor::{DelegatedCall, DelegatedExecutor, RescueIntent};
use super::grant::PermissionGrant;
use crate::chain::rpc::{JsonRpcClient, RpcCallError};
use crate::config::BundlerConfig;
use crate::error::{Error, Result};
use crate::guardian::types::{AssetKind, TransactionReceipt};

/// Fee pair for one gas price tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// `pimlico_getUserOperationGasPrice` result
#[derive(Debug, Clone, Deserialize)]
pub struct GasPriceTiers {
    pub slow: UserOperationFees,
    pub standard: UserOperationFees,
    pub fast: UserOperationFees,
}

/// Payload of a delegated call submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<Address>,
    calls: [&'a DelegatedCall; 1],
    #[serde(flatten)]
    fees: UserOperationFees,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinedTransaction {
    transaction_hash: B256,
}

/// `eth_getUserOperationReceipt` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: Option<B256>,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    receipt: MinedTransaction,
}

impl UserOperationReceipt {
    pub fn transaction_hash(&self) -> B256 {
        self.receipt.transaction_hash
    }
}

/// Delegated executor speaking to a bundler/relayer over JSON-RPC
pub struct RelayerExecutor {
    rpc: JsonRpcClient,
    config: BundlerConfig,
    token: Address,
}

impl RelayerExecutor {
    /// Create a relayer executor for the configured bundler
    pub fn new(config: BundlerConfig, token: Address) -> Result<Self> {
        if config.submit_method.trim().is_empty() {
            return Err(Error::Config(
                "bundler.submit_method must name the relayer's delegated-call method".to_string(),
            ));
        }

        let rpc = JsonRpcClient::new(
            config.rpc_url(),
            Duration::from_millis(config.request_timeout_ms),
        )?;

        info!("Relayer executor initialized for {}", config.masked_endpoint());

        Ok(Self { rpc, config, token })
    }

    /// Current user-operation gas prices
    pub async fn gas_price(&self) -> Result<GasPriceTiers> {
        self.rpc
            .call("pimlico_getUserOperationGasPrice", json!([]))
            .await
            .map_err(Error::from)
    }

    /// Submit with retry on transient transport errors
    async fn submit(&self, intent: &RescueIntent, fees: UserOperationFees) -> Result<B256> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.submit_retry_base_delay_ms),
            max_interval: Duration::from_millis(self.config.submit_retry_base_delay_ms * 4),
            max_elapsed_time: Some(Duration::from_millis(self.config.submit_max_elapsed_ms)),
            ..Default::default()
        };

        let hash = retry(backoff, || async {
            match self.submit_once(intent, fees).await {
                Ok(hash) => Ok(hash),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable relayer error: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    error!("Permanent relayer error: {}", e);
                    Err(backoff::Error::permanent(e))
                }
            }
        })
        .await?;

        Ok(hash)
    }

    /// Single submission attempt
    async fn submit_once(&self, intent: &RescueIntent, fees: UserOperationFees) -> Result<B256> {
        let request = SubmitRequest {
            sender: intent.sender,
            calls: [&intent.call],
            fees,
        };

        match self.rpc.call(&self.config.submit_method, json!([request])).await {
            Ok(hash) => Ok(hash),
            Err(RpcCallError::Remote(obj)) => Err(Error::ExecutionRejected(format!(
                "{} (code {})",
                obj.message, obj.code
            ))),
            Err(RpcCallError::Transport(e)) => Err(e),
        }
    }

    /// Poll for the receipt until it lands or the confirmation window closes
    async fn await_receipt(&self, hash: B256) -> Result<UserOperationReceipt> {
        let timeout_ms = self.config.confirmation_timeout_ms;
        let poll = Duration::from_millis(self.config.receipt_poll_interval_ms);

        let wait = async {
            loop {
                match self
                    .rpc
                    .call_optional::<_, UserOperationReceipt>("eth_getUserOperationReceipt", json!([hash]))
                    .await
                {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!(%hash, "Receipt not yet available"),
                    Err(e) => warn!(%hash, "Receipt poll failed: {}", Error::from(e)),
                }
                tokio::time::sleep(poll).await;
            }
        };

        tokio::time::timeout(Duration::from_millis(timeout_ms), wait)
            .await
            .map_err(|_| Error::ConfirmationTimeout(timeout_ms))
    }
}

#[async_trait]
impl DelegatedExecutor for RelayerExecutor {
    async fn execute(
        &self,
        grant: &PermissionGrant,
        destination: Address,
        asset: AssetKind,
        amount: U256,
    ) -> Result<TransactionReceipt> {
        grant.ensure_usable(Utc::now())?;
        let intent = RescueIntent::build(grant, destination, asset, amount, self.token)?;

        let fees = self.gas_price().await?.fast;
        debug!(
            max_fee = %fees.max_fee_per_gas,
            priority_fee = %fees.max_priority_fee_per_gas,
            "Using fast gas tier"
        );

        let intent_hash = self.submit(&intent, fees).await?;
        info!(asset = %asset, amount = %amount, %intent_hash, "Rescue intent submitted");

        let receipt = self.await_receipt(intent_hash).await?;
        if !receipt.success {
            return Err(Error::ExecutionRejected(
                receipt
                    .reason
                    .unwrap_or_else(|| "user operation reverted".to_string()),
            ));
        }

        if let Some(op_hash) = receipt.user_op_hash.filter(|h| *h != intent_hash) {
            warn!(%intent_hash, %op_hash, "Receipt reports a different user operation hash");
        }

        let tx_hash = receipt.transaction_hash();
        info!(asset = %asset, %tx_hash, "Rescue confirmed on-chain");

        Ok(TransactionReceipt {
            intent_hash,
            tx_hash,
        })
    }
}
