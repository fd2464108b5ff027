//! Permission grants
//!
//! A grant is the user's one-time, time-boxed authorization for the session
//! account to move funds out of the protected account. It is issued by the
//! wallet (ERC-7715 `wallet_requestExecutionPermissions`) and stored outside
//! the guardian; we only load it and hand its opaque delegation context to
//! the relayer.

use alloy_primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::guardian::types::AssetKind;

/// Signer metadata returned alongside the permissions context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerMeta {
    /// DelegationManager contract that redeems the delegation
    #[serde(default)]
    pub delegation_manager: Option<Address>,
}

/// Permission type and parameters as granted by the wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDetails {
    /// e.g. "native-token-periodic", "erc20-token-periodic"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: PermissionData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionData {
    /// Allowance per period, base units
    #[serde(default)]
    pub period_amount: Option<U256>,

    /// Period length in seconds
    #[serde(default)]
    pub period_duration: Option<u64>,

    #[serde(default)]
    pub justification: Option<String>,
}

/// An issued permission grant for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub asset: AssetKind,

    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Opaque signed delegation chain; never inspected here
    #[serde(default)]
    pub context: Option<Bytes>,

    /// Unix seconds after which the grant must not be used
    pub expiry: i64,

    /// Session account the permission was granted to
    #[serde(default)]
    pub signer: Option<Address>,

    #[serde(default)]
    pub signer_meta: Option<SignerMeta>,

    #[serde(default)]
    pub permission: Option<PermissionDetails>,
}

/// Borrowed view of the fields a delegated call needs
#[derive(Debug, Clone, Copy)]
pub struct DelegationRef<'a> {
    pub context: &'a Bytes,
    pub delegation_manager: Address,
}

impl PermissionGrant {
    /// Expiry as a timestamp. Out-of-range values are treated as already expired.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expiry, 0)
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => at >= expiry,
            None => true,
        }
    }

    /// Extract the delegation fields, failing if any is missing
    pub fn delegation(&self) -> Result<DelegationRef<'_>> {
        let context = self
            .context
            .as_ref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidGrant(format!("{} grant has no delegation context", self.asset)))?;

        let delegation_manager = self
            .signer_meta
            .as_ref()
            .and_then(|m| m.delegation_manager)
            .ok_or_else(|| {
                Error::InvalidGrant(format!("{} grant has no delegation manager", self.asset))
            })?;

        Ok(DelegationRef {
            context,
            delegation_manager,
        })
    }

    /// Check the grant can authorize a transfer right now
    pub fn ensure_usable(&self, at: DateTime<Utc>) -> Result<DelegationRef<'_>> {
        let delegation = self.delegation()?;

        if self.is_expired(at) {
            return Err(Error::GrantExpired {
                asset: self.asset.to_string(),
                expiry: self
                    .expires_at()
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_else(|| self.expiry.to_string()),
            });
        }

        Ok(delegation)
    }

    /// Per-period allowance, if the grant declares one
    pub fn period_allowance(&self) -> Option<U256> {
        self.permission.as_ref().and_then(|p| p.data.period_amount)
    }
}

/// Grants available to a protection session, at most one per asset
#[derive(Debug, Clone, Default)]
pub struct GrantSet {
    grants: HashMap<AssetKind, PermissionGrant>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting duplicates for the same asset
    pub fn from_grants(grants: Vec<PermissionGrant>) -> Result<Self> {
        let mut set = Self::new();
        for grant in grants {
            set.insert(grant)?;
        }
        Ok(set)
    }

    /// Load grants from a JSON file (array of grants)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading permission grants from {}", path.display());

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Cannot read grants file {}: {}", path.display(), e)))?;

        let grants: Vec<PermissionGrant> = serde_json::from_str(&data)
            .map_err(|e| Error::Deserialization(format!("Invalid grants file {}: {}", path.display(), e)))?;

        let set = Self::from_grants(grants)?;
        info!("Loaded {} permission grant(s) from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn insert(&mut self, grant: PermissionGrant) -> Result<()> {
        if self.grants.contains_key(&grant.asset) {
            return Err(Error::Config(format!(
                "Duplicate permission grant for {}",
                grant.asset
            )));
        }
        self.grants.insert(grant.asset, grant);
        Ok(())
    }

    pub fn get(&self, asset: AssetKind) -> Option<&PermissionGrant> {
        self.grants.get(&asset)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionGrant> {
        AssetKind::ALL.into_iter().filter_map(|a| self.grants.get(&a))
    }
}
