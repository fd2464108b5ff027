//! Rescue orchestrator
//!
//! Decides, per balance snapshot, which assets to sweep to the safe
//! destination and drives the delegated executor.
//!
//! Rules:
//! - native below floor, token intact and non-zero: sweep the token
//! - token below floor, native intact and non-zero: sweep the native coin
//! - both below floor: sweep every non-zero asset, independently
//!
//! At most one executor call per asset is outstanding at any time. A cycle
//! that would fire inside the cooldown window is skipped entirely. Rescue
//! calls run as their own tasks so slow confirmations never hold up polling.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::activity::ActivityLog;
use super::policy::{Classification, ThresholdPolicy};
use super::session::ProtectionSession;
use super::types::{AssetKind, BalanceSnapshot, RescueOutcome, RescueState, ThresholdConfig};
use crate::config::{display_amount, CooldownScope};
use crate::delegation::executor::DelegatedExecutor;
use crate::error::Error;

/// Why a rescue fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescueTrigger {
    /// Native drained while the token is intact
    NativeCompromised,
    /// Token drained while the native coin is intact
    TokenCompromised,
    /// Both assets below floor
    Critical,
}

impl std::fmt::Display for RescueTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RescueTrigger::NativeCompromised => write!(f, "native below floor"),
            RescueTrigger::TokenCompromised => write!(f, "token below floor"),
            RescueTrigger::Critical => write!(f, "both assets below floor"),
        }
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub thresholds: ThresholdConfig,
    pub cooldown: Duration,
    pub cooldown_scope: CooldownScope,
    /// Hard bound on one executor call
    pub rescue_timeout: Duration,
    pub native_decimals: u8,
    pub token_decimals: u8,
}

impl OrchestratorConfig {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            cooldown: Duration::from_secs(30),
            cooldown_scope: CooldownScope::Global,
            rescue_timeout: Duration::from_secs(150),
            native_decimals: 18,
            token_decimals: 6,
        }
    }

    fn decimals_of(&self, asset: AssetKind) -> u8 {
        match asset {
            AssetKind::Native => self.native_decimals,
            AssetKind::Token => self.token_decimals,
        }
    }
}

/// What an evaluation cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleDecision {
    /// Nothing warranted a rescue
    NoAction,
    /// A rescue was warranted but every candidate was in flight or disabled
    Held,
    /// Inside the cooldown window; nothing evaluated further
    CooldownActive { remaining: chrono::Duration },
    /// Rescues started for these assets
    Dispatched(Vec<AssetKind>),
}

/// Result of one evaluation
#[derive(Debug)]
pub struct CycleReport {
    pub decision: CycleDecision,
    /// Outstanding rescue tasks; dropping them detaches the rescues
    pub rescues: Vec<JoinHandle<RescueOutcome>>,
}

impl CycleReport {
    fn idle(decision: CycleDecision) -> Self {
        Self {
            decision,
            rescues: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RescueBook {
    native: RescueState,
    token: RescueState,
    last_global_rescue_at: Option<DateTime<Utc>>,
}

impl RescueBook {
    fn state(&self, asset: AssetKind) -> &RescueState {
        match asset {
            AssetKind::Native => &self.native,
            AssetKind::Token => &self.token,
        }
    }

    fn state_mut(&mut self, asset: AssetKind) -> &mut RescueState {
        match asset {
            AssetKind::Native => &mut self.native,
            AssetKind::Token => &mut self.token,
        }
    }
}

/// A reserved rescue, ready to hand to the executor
struct Reservation {
    asset: AssetKind,
    amount: U256,
    trigger: RescueTrigger,
    attempt_id: Uuid,
}

/// Owns per-asset rescue state and fires delegated rescues
pub struct RescueOrchestrator {
    session: Arc<ProtectionSession>,
    config: OrchestratorConfig,
    cooldown: chrono::Duration,
    executor: Arc<dyn DelegatedExecutor>,
    book: Arc<Mutex<RescueBook>>,
    activity: ActivityLog,
}

impl RescueOrchestrator {
    pub fn new(
        session: Arc<ProtectionSession>,
        config: OrchestratorConfig,
        executor: Arc<dyn DelegatedExecutor>,
        activity: ActivityLog,
    ) -> Self {
        let cooldown = chrono::Duration::from_std(config.cooldown).unwrap_or(chrono::Duration::MAX);

        Self {
            session,
            config,
            cooldown,
            executor,
            book: Arc::new(Mutex::new(RescueBook::default())),
            activity,
        }
    }

    pub fn session(&self) -> &Arc<ProtectionSession> {
        &self.session
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.config.thresholds
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Current rescue state of one asset
    pub async fn state(&self, asset: AssetKind) -> RescueState {
        self.book.lock().await.state(asset).clone()
    }

    pub async fn last_global_rescue_at(&self) -> Option<DateTime<Utc>> {
        self.book.lock().await.last_global_rescue_at
    }

    /// Assets the policy wants swept for this snapshot, ignoring rescue state
    pub fn rescue_candidates(
        snapshot: &BalanceSnapshot,
        classification: Classification,
    ) -> Vec<(AssetKind, RescueTrigger)> {
        let mut candidates = Vec::with_capacity(2);

        if classification.is_critical() {
            for asset in AssetKind::ALL {
                if !snapshot.balance_of(asset).is_zero() {
                    candidates.push((asset, RescueTrigger::Critical));
                }
            }
        } else if classification.native_below {
            if !snapshot.token_balance.is_zero() {
                candidates.push((AssetKind::Token, RescueTrigger::NativeCompromised));
            }
        } else if classification.token_below && !snapshot.native_balance.is_zero() {
            candidates.push((AssetKind::Native, RescueTrigger::TokenCompromised));
        }

        candidates
    }

    /// Evaluate one snapshot. The snapshot's observation time is the
    /// cycle's clock for cooldown purposes.
    pub async fn evaluate(&self, snapshot: &BalanceSnapshot) -> CycleReport {
        let now = snapshot.observed_at;
        let classification = ThresholdPolicy::classify(snapshot, &self.config.thresholds);
        let candidates = Self::rescue_candidates(snapshot, classification);

        if candidates.is_empty() {
            debug!(
                native = %snapshot.native_balance,
                token = %snapshot.token_balance,
                native_below = classification.native_below,
                token_below = classification.token_below,
                "No rescue warranted"
            );
            return CycleReport::idle(CycleDecision::NoAction);
        }

        let mut book = self.book.lock().await;

        if self.config.cooldown_scope == CooldownScope::Global {
            if let Some(remaining) = self.cooldown_remaining(book.last_global_rescue_at, now) {
                drop(book);
                self.log_cooldown_skip(&candidates, remaining, now).await;
                return CycleReport::idle(CycleDecision::CooldownActive { remaining });
            }
        }

        let mut reservations = Vec::new();
        let mut grant_failures = Vec::new();
        let mut cooling = None;

        for (asset, trigger) in candidates {
            let state = book.state(asset);

            if state.in_flight {
                debug!(asset = %asset, "Rescue already in flight");
                continue;
            }

            if let Some(reason) = &state.disabled {
                debug!(asset = %asset, "Rescue path disabled: {}", reason);
                continue;
            }

            if self.config.cooldown_scope == CooldownScope::PerAsset {
                if let Some(remaining) = self.cooldown_remaining(state.last_attempt_at, now) {
                    cooling = Some((asset, remaining));
                    continue;
                }
            }

            // A grant that cannot authorize the transfer never reaches the executor
            if let Err(e) = self.check_grant(asset, now) {
                let state = book.state_mut(asset);
                state.last_outcome = Some(RescueOutcome::Failure {
                    reason: e.to_string(),
                });
                state.disabled = Some(e.to_string());
                grant_failures.push((asset, e));
                continue;
            }

            let attempt_id = Uuid::new_v4();
            let state = book.state_mut(asset);
            state.in_flight = true;
            state.attempt_id = Some(attempt_id);
            state.last_attempt_at = Some(now);
            book.last_global_rescue_at = Some(now);

            reservations.push(Reservation {
                asset,
                amount: snapshot.balance_of(asset),
                trigger,
                attempt_id,
            });
        }
        drop(book);

        for (asset, e) in grant_failures {
            error!(asset = %asset, "Rescue blocked by permission grant: {}", e);
            self.activity
                .push_at(now, format!("Cannot rescue {}: {}", asset, e))
                .await;
        }

        if reservations.is_empty() {
            if let Some((asset, remaining)) = cooling {
                self.log_cooldown_skip(&[(asset, RescueTrigger::Critical)], remaining, now)
                    .await;
                return CycleReport::idle(CycleDecision::CooldownActive { remaining });
            }
            return CycleReport::idle(CycleDecision::Held);
        }

        let assets: Vec<AssetKind> = reservations.iter().map(|r| r.asset).collect();
        let mut rescues = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            rescues.push(self.dispatch(reservation, now).await);
        }

        CycleReport {
            decision: CycleDecision::Dispatched(assets),
            rescues,
        }
    }

    fn cooldown_remaining(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<chrono::Duration> {
        let elapsed = now.signed_duration_since(last?);
        if elapsed < self.cooldown {
            // A clock that stepped backwards can push this past the representable range
            Some(
                self.cooldown
                    .checked_sub(&elapsed)
                    .unwrap_or(chrono::Duration::MAX),
            )
        } else {
            None
        }
    }

    fn check_grant(&self, asset: AssetKind, now: DateTime<Utc>) -> crate::error::Result<()> {
        let grant = self
            .session
            .grant(asset)
            .ok_or_else(|| Error::GrantMissing(asset.to_string()))?;
        grant.ensure_usable(now)?;
        Ok(())
    }

    async fn log_cooldown_skip(
        &self,
        candidates: &[(AssetKind, RescueTrigger)],
        remaining: chrono::Duration,
        now: DateTime<Utc>,
    ) {
        let assets = candidates
            .iter()
            .map(|(a, _)| a.to_string())
            .collect::<Vec<_>>()
            .join(" + ");

        warn!(
            assets = %assets,
            remaining_ms = remaining.num_milliseconds(),
            "Rescue skipped: cooldown active"
        );
        self.activity
            .push_at(
                now,
                format!(
                    "Rescue of {} skipped: cooldown active ({}s remaining)",
                    assets,
                    remaining.num_seconds().max(1)
                ),
            )
            .await;
    }

    /// Start the executor call for a reserved rescue on its own task
    async fn dispatch(&self, reservation: Reservation, now: DateTime<Utc>) -> JoinHandle<RescueOutcome> {
        let Reservation {
            asset,
            amount,
            trigger,
            attempt_id,
        } = reservation;

        let destination = self.session.safe_destination();
        let amount_display = display_amount(amount, self.config.decimals_of(asset));

        info!(
            asset = %asset,
            amount = %amount,
            attempt = %attempt_id,
            %destination,
            "Rescue triggered: {}",
            trigger
        );
        self.activity
            .push_at(
                now,
                format!(
                    "{}: sweeping {} {} to safe destination",
                    capitalize(&trigger.to_string()),
                    amount_display,
                    asset
                ),
            )
            .await;

        let session = self.session.clone();
        let executor = self.executor.clone();
        let book = self.book.clone();
        let activity = self.activity.clone();
        let rescue_timeout = self.config.rescue_timeout;

        tokio::spawn(async move {
            let result = match session.grant(asset) {
                Some(grant) => {
                    match tokio::time::timeout(
                        rescue_timeout,
                        executor.execute(grant, destination, asset, amount),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::ConfirmationTimeout(rescue_timeout.as_millis() as u64)),
                    }
                }
                None => Err(Error::GrantMissing(asset.to_string())),
            };

            let (outcome, message) = match &result {
                Ok(receipt) => {
                    info!(
                        asset = %asset,
                        attempt = %attempt_id,
                        tx_hash = %receipt.tx_hash,
                        "Rescue succeeded"
                    );
                    (
                        RescueOutcome::Success {
                            tx_hash: receipt.tx_hash,
                        },
                        format!("Rescued {} {} (tx {})", amount_display, asset, receipt.tx_hash),
                    )
                }
                Err(e) => {
                    error!(asset = %asset, attempt = %attempt_id, "Rescue failed: {}", e);
                    (
                        RescueOutcome::Failure {
                            reason: e.to_string(),
                        },
                        format!("Rescue of {} failed: {}", asset, e),
                    )
                }
            };

            {
                let mut book = book.lock().await;
                let state = book.state_mut(asset);
                state.in_flight = false;
                state.attempt_id = None;
                state.last_outcome = Some(outcome.clone());
                if let Err(Error::InvalidGrant(reason)) = &result {
                    state.disabled = Some(reason.clone());
                }
            }

            activity.push(message).await;
            outcome
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
