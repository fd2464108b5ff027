//! Configuration loading and validation

use alloy_primitives::utils::{format_units, parse_units, ParseUnits};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::guardian::types::{AssetKind, ThresholdConfig};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub bundler: BundlerConfig,
    pub guardian: GuardianConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            chain_id: default_chain_id(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Bundler / relayer connection
#[derive(Debug, Clone, Deserialize)]
pub struct BundlerConfig {
    #[serde(default = "default_bundler_endpoint")]
    pub endpoint: String,
    /// Appended as `apikey` query parameter when set
    #[serde(default)]
    pub api_key: String,
    /// JSON-RPC method accepting delegated call submissions. Relayer
    /// specific, so there is no default; plain ERC-4337 bundlers do not
    /// expose one.
    #[serde(default)]
    pub submit_method: String,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_submit_retry_base_delay_ms")]
    pub submit_retry_base_delay_ms: u64,
    #[serde(default = "default_submit_max_elapsed_ms")]
    pub submit_max_elapsed_ms: u64,
}

impl BundlerConfig {
    /// Endpoint with the API key attached
    pub fn rpc_url(&self) -> String {
        if self.api_key.is_empty() {
            return self.endpoint.clone();
        }
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}apikey={}", self.endpoint, separator, self.api_key)
    }

    pub fn masked_endpoint(&self) -> String {
        mask_url(&self.rpc_url())
    }
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bundler_endpoint(),
            api_key: String::new(),
            submit_method: String::new(),
            request_timeout_ms: default_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            submit_retry_base_delay_ms: default_submit_retry_base_delay_ms(),
            submit_max_elapsed_ms: default_submit_max_elapsed_ms(),
        }
    }
}

/// Whether the rescue cooldown is shared across assets
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One cooldown measured from the last rescue of any asset
    #[default]
    Global,
    /// Each asset cools down from its own last attempt
    PerAsset,
}

/// What to protect and when to act
#[derive(Debug, Clone, Deserialize)]
pub struct GuardianConfig {
    /// Account being watched for compromise
    pub protected_account: String,
    /// Where rescued funds go
    pub safe_destination: String,
    /// ERC-20 token protected alongside the native coin
    #[serde(default = "default_token_address")]
    pub token_address: String,

    /// Native floor in whole units, e.g. "0.1" ETH
    #[serde(default = "default_native_floor")]
    pub native_floor: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    /// Token floor in whole units, e.g. "10" USDC
    #[serde(default = "default_token_floor")]
    pub token_floor: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub cooldown_scope: CooldownScope,
    /// Outer bound on a single rescue attempt, including confirmation
    #[serde(default = "default_rescue_timeout_ms")]
    pub rescue_timeout_ms: u64,

    /// JSON file holding the issued permission grants
    #[serde(default = "default_grants_path")]
    pub grants_path: PathBuf,
}

impl GuardianConfig {
    pub fn protected_account(&self) -> Result<Address> {
        parse_address("protected_account", &self.protected_account)
    }

    pub fn safe_destination(&self) -> Result<Address> {
        parse_address("safe_destination", &self.safe_destination)
    }

    pub fn token_address(&self) -> Result<Address> {
        parse_address("token_address", &self.token_address)
    }

    /// Floors converted to base units
    pub fn thresholds(&self) -> Result<ThresholdConfig> {
        Ok(ThresholdConfig {
            native_floor: parse_amount("native_floor", &self.native_floor, self.native_decimals)?,
            token_floor: parse_amount("token_floor", &self.token_floor, self.token_decimals)?,
        })
    }

    pub fn decimals_of(&self, asset: AssetKind) -> u8 {
        match asset {
            AssetKind::Native => self.native_decimals,
            AssetKind::Token => self.token_decimals,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn rescue_timeout(&self) -> Duration {
        Duration::from_millis(self.rescue_timeout_ms)
    }
}

fn default_rpc_endpoint() -> String {
    "https://ethereum-sepolia-rpc.publicnode.com".to_string()
}

fn default_chain_id() -> u64 {
    11155111
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_bundler_endpoint() -> String {
    "https://api.pimlico.io/v2/11155111/rpc".to_string()
}

fn default_confirmation_timeout_ms() -> u64 {
    120000
}

fn default_receipt_poll_interval_ms() -> u64 {
    2000
}

fn default_submit_retry_base_delay_ms() -> u64 {
    250
}

fn default_submit_max_elapsed_ms() -> u64 {
    5000
}

fn default_token_address() -> String {
    // USDC on Sepolia
    "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".to_string()
}

fn default_native_floor() -> String {
    "0.1".to_string()
}

fn default_native_decimals() -> u8 {
    18
}

fn default_token_floor() -> String {
    "10".to_string()
}

fn default_token_decimals() -> u8 {
    6
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_cooldown_ms() -> u64 {
    30000
}

fn default_rescue_timeout_ms() -> u64 {
    150000
}

fn default_grants_path() -> PathBuf {
    PathBuf::from("grants.json")
}

/// Parse a 20-byte hex address
fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| Error::InvalidAddress(format!("{} {:?}: {}", field, value, e)).into())
}

/// Parse a decimal amount in whole units into base units
fn parse_amount(field: &str, value: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(value.trim(), decimals)
        .with_context(|| format!("Invalid {} amount: {:?}", field, value))?;

    match parsed {
        ParseUnits::U256(amount) => Ok(amount),
        ParseUnits::I256(_) => anyhow::bail!("{} cannot be negative", field),
    }
}

/// Render base units as a decimal amount for display
pub fn display_amount(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("guardian.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("guardian.cooldown_ms", default_cooldown_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix AEGIS_)
            .add_source(
                config::Environment::with_prefix("AEGIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let guardian = &self.guardian;

        // Validate addresses
        let protected = guardian.protected_account()?;
        let safe = guardian.safe_destination()?;
        guardian.token_address()?;

        if protected == safe {
            anyhow::bail!("safe_destination must differ from protected_account");
        }

        if safe == Address::ZERO {
            anyhow::bail!("safe_destination cannot be the zero address");
        }

        // Floors must be strictly positive
        let thresholds = guardian.thresholds()?;
        if thresholds.native_floor.is_zero() {
            anyhow::bail!("native_floor must be positive");
        }
        if thresholds.token_floor.is_zero() {
            anyhow::bail!("token_floor must be positive");
        }

        // Validate timing
        if guardian.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }

        if self.bundler.receipt_poll_interval_ms == 0 {
            anyhow::bail!("receipt_poll_interval_ms must be positive");
        }

        if guardian.rescue_timeout_ms < self.bundler.confirmation_timeout_ms {
            anyhow::bail!(
                "rescue_timeout_ms ({}) must not be shorter than confirmation_timeout_ms ({})",
                guardian.rescue_timeout_ms,
                self.bundler.confirmation_timeout_ms
            );
        }

        // Validate endpoints
        url::Url::parse(&self.rpc.endpoint)
            .with_context(|| format!("Invalid rpc.endpoint: {}", self.rpc.endpoint))?;
        url::Url::parse(&self.bundler.endpoint)
            .with_context(|| format!("Invalid bundler.endpoint: {}", mask_url(&self.bundler.endpoint)))?;

        if self.bundler.submit_method.is_empty() {
            tracing::warn!("bundler.submit_method is not set - only --dry-run rescues are possible");
        }

        if self.bundler.api_key.is_empty() {
            tracing::warn!("bundler.api_key is not set - most hosted bundlers will refuse requests");
        }

        if guardian.cooldown_ms < guardian.poll_interval_ms {
            tracing::warn!(
                "cooldown_ms ({}) is shorter than poll_interval_ms ({}) - cooldown will never skip a tick",
                guardian.cooldown_ms,
                guardian.poll_interval_ms
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    chain_id: {}
    timeout: {}ms
  Bundler:
    endpoint: {}
    api_key: {}
    submit_method: {}
    confirmation_timeout: {}ms
  Guardian:
    protected_account: {}
    safe_destination: {}
    token_address: {}
    native_floor: {}
    token_floor: {}
    poll_interval: {}ms
    cooldown: {}ms ({:?})
    rescue_timeout: {}ms
    grants_path: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.chain_id,
            self.rpc.timeout_ms,
            mask_url(&self.bundler.endpoint),
            if self.bundler.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            if self.bundler.submit_method.is_empty() {
                "(not set)"
            } else {
                self.bundler.submit_method.as_str()
            },
            self.bundler.confirmation_timeout_ms,
            self.guardian.protected_account,
            self.guardian.safe_destination,
            self.guardian.token_address,
            self.guardian.native_floor,
            self.guardian.token_floor,
            self.guardian.poll_interval_ms,
            self.guardian.cooldown_ms,
            self.guardian.cooldown_scope,
            self.guardian.rescue_timeout_ms,
            self.guardian.grants_path.display(),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
