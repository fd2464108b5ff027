//! Monitor, decide, rescue
//!
//! The monitor polls balances of the protected account, the threshold
//! policy classifies each snapshot, and the orchestrator sweeps surviving
//! assets to the safe destination through the delegated executor.

pub mod activity;
pub mod monitor;
pub mod orchestrator;
pub mod policy;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{ActivityLog, ActivityLogEntry, ACTIVITY_LOG_CAPACITY};
pub use monitor::MonitorLoop;
pub use orchestrator::{CycleDecision, OrchestratorConfig, RescueOrchestrator, RescueTrigger};
pub use policy::{Classification, ThresholdPolicy};
pub use session::ProtectionSession;
pub use types::{
    AssetKind, BalanceBoard, BalanceSnapshot, CompromiseVerdict, RescueOutcome, RescueState,
    ThresholdConfig, TransactionReceipt,
};
