//! Balance monitor
//!
//! Polls the protected account on a fixed interval and hands every
//! successful snapshot to the rescue orchestrator. Only one poll runs at a
//! time; ticks that fall behind are skipped rather than queued.

use alloy_primitives::{Address, U256};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::activity::ActivityLog;
use super::orchestrator::{CycleDecision, RescueOrchestrator};
use super::types::{BalanceBoard, BalanceSnapshot};
use crate::chain::ChainReader;
use crate::error::{Error, Result};

struct RunningLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct MonitorInner {
    reader: Arc<dyn ChainReader>,
    orchestrator: Arc<RescueOrchestrator>,
    board: RwLock<BalanceBoard>,
}

impl MonitorInner {
    async fn read_pair(&self, account: Address) -> Result<(U256, U256)> {
        let token = self.orchestrator.session().token_address();
        futures::try_join!(
            self.reader.native_balance(account),
            self.reader.token_balance(token, account)
        )
    }

    /// One monitoring cycle: read, evaluate, publish
    async fn poll_once(&self) -> Result<CycleDecision> {
        let session = self.orchestrator.session();

        let (native, token) = match self.read_pair(session.protected_account()).await {
            Ok(pair) => pair,
            Err(e) => {
                let e = match e {
                    Error::ReadFailure(_) => e,
                    other => Error::ReadFailure(other.to_string()),
                };
                warn!("Skipping cycle: {}", e);
                self.orchestrator.activity().push(e.to_string()).await;
                return Err(e);
            }
        };

        let snapshot = BalanceSnapshot::new(native, token, Utc::now());
        debug!(native = %native, token = %token, "Balance snapshot");

        let report = self.orchestrator.evaluate(&snapshot).await;
        // Rescues keep running on their own tasks
        drop(report.rescues);

        {
            let mut board = self.board.write().await;
            board.protected_native = Some(native);
            board.protected_token = Some(token);
            board.updated_at = Some(snapshot.observed_at);
        }
        self.refresh_safe_balances().await;

        Ok(report.decision)
    }

    /// Read both balances for display only; nothing is evaluated
    async fn refresh_display(&self) {
        let session = self.orchestrator.session();

        match self.read_pair(session.protected_account()).await {
            Ok((native, token)) => {
                let mut board = self.board.write().await;
                board.protected_native = Some(native);
                board.protected_token = Some(token);
                board.updated_at = Some(Utc::now());
            }
            Err(e) => warn!("Initial balance read failed: {}", e),
        }
        self.refresh_safe_balances().await;
    }

    async fn refresh_safe_balances(&self) {
        let destination = self.orchestrator.session().safe_destination();

        match self.read_pair(destination).await {
            Ok((native, token)) => {
                let mut board = self.board.write().await;
                board.safe_native = Some(native);
                board.safe_token = Some(token);
            }
            Err(e) => debug!("Safe destination read failed: {}", e),
        }
    }
}

/// Periodic balance monitor for one protection session
pub struct MonitorLoop {
    inner: Arc<MonitorInner>,
    poll_interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl MonitorLoop {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        orchestrator: Arc<RescueOrchestrator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                reader,
                orchestrator,
                board: RwLock::new(BalanceBoard::default()),
            }),
            poll_interval,
            running: Mutex::new(None),
        }
    }

    pub fn activity(&self) -> &ActivityLog {
        self.inner.orchestrator.activity()
    }

    pub fn orchestrator(&self) -> &Arc<RescueOrchestrator> {
        &self.inner.orchestrator
    }

    /// Last balances read for the protected account and safe destination
    pub async fn balances(&self) -> BalanceBoard {
        self.inner.board.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Run one cycle immediately, outside the periodic loop
    pub async fn poll_once(&self) -> Result<CycleDecision> {
        self.inner.poll_once().await
    }

    /// Start periodic monitoring. Returns false if already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Monitor already running");
            return false;
        }

        self.inner.refresh_display().await;

        info!(
            "Starting balance monitor with {}ms poll interval",
            self.poll_interval.as_millis()
        );
        self.activity().push("Protection monitoring started").await;

        let inner = self.inner.clone();
        let period = self.poll_interval;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Balance monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Ok(decision) = inner.poll_once().await {
                            debug!(?decision, "Cycle complete");
                        }
                    }
                }
            }
        });

        *running = Some(RunningLoop { handle, cancel });
        true
    }

    /// Stop periodic monitoring. A cycle already in progress finishes
    /// first; rescues already dispatched keep running. Returns false if
    /// the monitor was not running.
    pub async fn stop(&self) -> bool {
        let Some(RunningLoop { handle, cancel }) = self.running.lock().await.take() else {
            return false;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!("Monitor task ended abnormally: {}", e);
        }

        self.activity().push("Protection monitoring paused").await;
        true
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut() {
            running.cancel.cancel();
        }
    }
}
