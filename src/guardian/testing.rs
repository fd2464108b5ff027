//! Test doubles for the chain reader and delegated executor

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::chain::ChainReader;
use crate::delegation::executor::DelegatedExecutor;
use crate::delegation::grant::PermissionGrant;
use crate::error::{Error, Result};
use crate::guardian::types::{AssetKind, TransactionReceipt};

/// How the fake executor answers for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorBehavior {
    Succeed,
    ConfirmationTimeout,
    Rejected,
    InvalidGrant,
}

/// One recorded executor call
#[derive(Debug, Clone)]
pub struct ExecutorCall {
    pub asset: AssetKind,
    pub destination: Address,
    pub amount: U256,
}

/// Executor that records calls and answers per configured behavior.
/// A gated executor blocks each call until [`RecordingExecutor::release`].
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
    behaviors: Mutex<HashMap<AssetKind, ExecutorBehavior>>,
    gate: Option<Semaphore>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behaviors: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn set_behavior(&self, asset: AssetKind, behavior: ExecutorBehavior) {
        self.behaviors.lock().unwrap().insert(asset, behavior);
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Let `n` blocked calls proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until at least `n` calls have been recorded
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.call_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("executor was never called");
    }
}

#[async_trait]
impl DelegatedExecutor for RecordingExecutor {
    async fn execute(
        &self,
        _grant: &PermissionGrant,
        destination: Address,
        asset: AssetKind,
        amount: U256,
    ) -> Result<TransactionReceipt> {
        self.calls.lock().unwrap().push(ExecutorCall {
            asset,
            destination,
            amount,
        });

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&asset)
            .copied()
            .unwrap_or(ExecutorBehavior::Succeed);

        match behavior {
            ExecutorBehavior::Succeed => Ok(TransactionReceipt {
                intent_hash: B256::repeat_byte(0x01),
                tx_hash: B256::repeat_byte(0x02),
            }),
            ExecutorBehavior::ConfirmationTimeout => Err(Error::ConfirmationTimeout(120_000)),
            ExecutorBehavior::Rejected => {
                Err(Error::ExecutionRejected("allowance exceeded".to_string()))
            }
            ExecutorBehavior::InvalidGrant => {
                Err(Error::InvalidGrant("delegation revoked".to_string()))
            }
        }
    }
}

/// Reader returning fixed balances per account, with a failure switch
pub struct ScriptedReader {
    balances: Mutex<HashMap<Address, (U256, U256)>>,
    failing: AtomicBool,
    reads: AtomicUsize,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set_balances(&self, account: Address, native: u64, token: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(account, (U256::from(native), U256::from(token)));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of native balance reads so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn lookup(&self, account: Address) -> Result<(U256, U256)> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::ReadFailure("node unreachable".to_string()));
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&account)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChainReader for ScriptedReader {
    async fn native_balance(&self, account: Address) -> Result<U256> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.lookup(account).map(|(native, _)| native)
    }

    async fn token_balance(&self, _token: Address, account: Address) -> Result<U256> {
        self.lookup(account).map(|(_, token)| token)
    }
}
