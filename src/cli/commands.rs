//! CLI command implementations

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use chrono::Utc;
use dialoguer::Confirm;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::chain::{ChainReader, JsonRpcChainReader};
use crate::config::{display_amount, Config};
use crate::delegation::{DelegatedExecutor, DryRunExecutor, GrantSet, RelayerExecutor};
use crate::guardian::{
    ActivityLog, AssetKind, BalanceSnapshot, MonitorLoop, OrchestratorConfig, ProtectionSession,
    RescueOrchestrator, ThresholdPolicy,
};

/// How often the running guardian logs a status line
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

fn build_reader(config: &Config) -> Result<JsonRpcChainReader> {
    JsonRpcChainReader::new(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
    )
    .context("Failed to create RPC client")
}

fn load_grants(config: &Config) -> Result<GrantSet> {
    let path = &config.guardian.grants_path;
    GrantSet::load(path).with_context(|| format!("Failed to load grants from {}", path.display()))
}

/// Start protecting the configured account
pub async fn start(config: &Config, dry_run: bool, force: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - no rescue will be submitted");
    }

    let guardian = &config.guardian;
    let protected = guardian.protected_account()?;
    let safe = guardian.safe_destination()?;
    let token = guardian.token_address()?;
    let thresholds = guardian.thresholds()?;

    info!("Starting guardian for {}", protected);
    info!(
        "Floors: {} native, {} token. Safe destination: {}",
        guardian.native_floor, guardian.token_floor, safe
    );

    // Connectivity check doubles as a chain sanity check
    let reader = build_reader(config)?;
    let chain_id = reader.chain_id().await.context("RPC endpoint unreachable")?;
    if chain_id != config.rpc.chain_id {
        anyhow::bail!(
            "RPC endpoint serves chain {} but chain {} is configured",
            chain_id,
            config.rpc.chain_id
        );
    }

    let grants = load_grants(config)?;
    let now = Utc::now();
    for grant in grants.iter() {
        if let Some(grant_chain) = grant.chain_id {
            if grant_chain != chain_id {
                warn!(
                    asset = %grant.asset,
                    "Grant was issued for chain {} but the node serves chain {}",
                    grant_chain,
                    chain_id
                );
            }
        }
        if let Err(e) = grant.ensure_usable(now) {
            warn!("{}", e);
        }
    }

    // Confirmation prompt (unless --force)
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Protect {}? Drained assets will be swept to {} without further prompts.",
                protected, safe
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Start cancelled by user");
            return Ok(());
        }
    }

    let executor: Arc<dyn DelegatedExecutor> = if dry_run {
        Arc::new(DryRunExecutor::new(token))
    } else {
        Arc::new(RelayerExecutor::new(config.bundler.clone(), token)?)
    };

    let session = Arc::new(ProtectionSession::new(protected, safe, token, grants)?);
    let orchestrator_config = OrchestratorConfig {
        thresholds,
        cooldown: guardian.cooldown(),
        cooldown_scope: guardian.cooldown_scope,
        rescue_timeout: guardian.rescue_timeout(),
        native_decimals: guardian.native_decimals,
        token_decimals: guardian.token_decimals,
    };
    let orchestrator = Arc::new(RescueOrchestrator::new(
        session,
        orchestrator_config,
        executor,
        ActivityLog::new(),
    ));
    let monitor = MonitorLoop::new(Arc::new(reader), orchestrator, guardian.poll_interval());

    monitor.start().await;

    supervise(
        &monitor,
        (guardian.native_decimals, guardian.token_decimals),
        STATUS_INTERVAL,
        tokio::signal::ctrl_c(),
    )
    .await;

    println!("\n=== RECENT ACTIVITY ===\n");
    for entry in monitor.activity().entries().await {
        println!("{}", entry);
    }

    Ok(())
}

/// Log a status line every `status_every` until `shutdown` resolves, then
/// stop the monitor
async fn supervise<F>(
    monitor: &MonitorLoop,
    (native_decimals, token_decimals): (u8, u8),
    status_every: Duration,
    shutdown: F,
) where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);

    let mut status = tokio::time::interval(status_every);
    status.tick().await;

    loop {
        tokio::select! {
            _ = status.tick() => {
                let board = monitor.balances().await;
                info!(
                    native = %fmt_balance(board.protected_native, native_decimals),
                    token = %fmt_balance(board.protected_token, token_decimals),
                    safe_native = %fmt_balance(board.safe_native, native_decimals),
                    safe_token = %fmt_balance(board.safe_token, token_decimals),
                    "Guardian status"
                );
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    error!("Shutdown signal listener failed: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
        }
    }

    monitor.stop().await;
}

/// Show balances of the protected account and the safe destination
pub async fn balances(config: &Config) -> Result<()> {
    let guardian = &config.guardian;
    let protected = guardian.protected_account()?;
    let safe = guardian.safe_destination()?;
    let token = guardian.token_address()?;
    let thresholds = guardian.thresholds()?;

    let reader = build_reader(config)?;

    let reads = futures::future::join_all([protected, safe].map(|account| {
        let reader = &reader;
        async move {
            let native = reader.native_balance(account).await?;
            let token_balance = reader.token_balance(token, account).await?;
            Ok::<(Address, U256, U256), crate::Error>((account, native, token_balance))
        }
    }))
    .await;

    println!("\n=== BALANCES ===\n");

    for (label, read) in ["Protected account", "Safe destination"].iter().zip(reads) {
        let (account, native, token_balance) = match read {
            Ok(values) => values,
            Err(e) => {
                error!("{} read failed: {}", label, e);
                println!("{}: unavailable ({})", label, e);
                continue;
            }
        };

        println!("{} ({})", label, account);
        println!(
            "  Native: {}",
            display_amount(native, guardian.native_decimals)
        );
        println!(
            "  Token:  {}",
            display_amount(token_balance, guardian.token_decimals)
        );

        if account == protected {
            let snapshot = BalanceSnapshot::new(native, token_balance, Utc::now());
            for verdict in ThresholdPolicy::verdicts(&snapshot, &thresholds) {
                if verdict.below_floor {
                    println!(
                        "  WARNING: {} below floor of {}",
                        verdict.asset,
                        display_amount(
                            thresholds.floor_of(verdict.asset),
                            guardian.decimals_of(verdict.asset)
                        )
                    );
                }
            }
        }
        println!();
    }

    Ok(())
}

/// Show the loaded permission grants and whether each can be used
pub async fn grants(config: &Config) -> Result<()> {
    let grants = load_grants(config)?;
    let now = Utc::now();

    println!("\n=== PERMISSION GRANTS ===\n");

    for asset in AssetKind::ALL {
        let Some(grant) = grants.get(asset) else {
            println!("{}: NOT ISSUED (cannot be rescued)", asset);
            continue;
        };

        let status = match grant.ensure_usable(now) {
            Ok(_) => "OK".to_string(),
            Err(e) => format!("UNUSABLE: {}", e),
        };
        println!("{}: {}", asset, status);

        match grant.expires_at() {
            Some(expiry) => println!("  Expiry: {}", expiry.to_rfc3339()),
            None => println!("  Expiry: invalid ({})", grant.expiry),
        }
        if let Some(chain_id) = grant.chain_id {
            println!("  Chain: {}", chain_id);
        }
        if let Some(signer) = grant.signer {
            println!("  Session account: {}", signer);
        }
        if let Some(manager) = grant.signer_meta.as_ref().and_then(|m| m.delegation_manager) {
            println!("  Delegation manager: {}", manager);
        }
        if let Some(allowance) = grant.period_allowance() {
            println!(
                "  Period allowance: {}",
                display_amount(allowance, config.guardian.decimals_of(asset))
            );
        }
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn fmt_balance(balance: Option<U256>, decimals: u8) -> String {
    balance
        .map(|b| display_amount(b, decimals))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::grant::tests::valid_grant;
    use crate::guardian::testing::{RecordingExecutor, ScriptedReader};
    use crate::guardian::ThresholdConfig;

    const PROTECTED: Address = Address::repeat_byte(0x01);

    fn running_monitor(reader: Arc<ScriptedReader>) -> MonitorLoop {
        let grants = GrantSet::from_grants(vec![
            valid_grant(AssetKind::Native),
            valid_grant(AssetKind::Token),
        ])
        .unwrap();
        let session = Arc::new(
            ProtectionSession::new(
                PROTECTED,
                Address::repeat_byte(0x5a),
                Address::repeat_byte(0x70),
                grants,
            )
            .unwrap(),
        );
        let orchestrator = Arc::new(RescueOrchestrator::new(
            session,
            OrchestratorConfig::new(ThresholdConfig {
                native_floor: U256::from(5u64),
                token_floor: U256::from(5u64),
            }),
            Arc::new(RecordingExecutor::new()),
            ActivityLog::new(),
        ));

        MonitorLoop::new(reader, orchestrator, Duration::from_millis(20))
    }

    #[test]
    fn test_fmt_balance() {
        assert_eq!(fmt_balance(None, 18), "-");
        assert_eq!(fmt_balance(Some(U256::from(7u64)), 0), "7");
    }

    #[tokio::test]
    async fn test_supervise_stops_monitor_on_shutdown() {
        let reader = Arc::new(ScriptedReader::new());
        reader.set_balances(PROTECTED, 10, 10);
        let monitor = running_monitor(reader);
        assert!(monitor.start().await);

        // Several status ticks elapse before the shutdown future resolves
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        };
        let supervised = tokio::time::timeout(
            Duration::from_secs(2),
            supervise(&monitor, (0, 0), Duration::from_millis(10), shutdown),
        )
        .await;

        assert!(supervised.is_ok());
        assert!(!monitor.is_running().await);
    }

    #[tokio::test]
    async fn test_supervise_stops_when_signal_listener_fails() {
        let monitor = running_monitor(Arc::new(ScriptedReader::new()));
        assert!(monitor.start().await);

        let shutdown = async { Err(std::io::Error::other("no signal handler")) };
        supervise(&monitor, (0, 0), Duration::from_secs(60), shutdown).await;

        assert!(!monitor.is_running().await);
    }
}
