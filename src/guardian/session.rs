//! Protection session
//!
//! Explicitly constructed value holding everything a monitoring session
//! needs to know about who is protected and with which grants. Built once,
//! then shared read-only between the monitor and the orchestrator.

use alloy_primitives::Address;
use tracing::warn;

use crate::delegation::grant::{GrantSet, PermissionGrant};
use crate::error::{Error, Result};

use super::types::AssetKind;

/// Addresses and grants for one protection session
#[derive(Debug, Clone)]
pub struct ProtectionSession {
    protected_account: Address,
    safe_destination: Address,
    token_address: Address,
    grants: GrantSet,
}

impl ProtectionSession {
    pub fn new(
        protected_account: Address,
        safe_destination: Address,
        token_address: Address,
        grants: GrantSet,
    ) -> Result<Self> {
        if protected_account == safe_destination {
            return Err(Error::Config(
                "Safe destination must differ from the protected account".to_string(),
            ));
        }

        for asset in AssetKind::ALL {
            if grants.get(asset).is_none() {
                warn!(asset = %asset, "No permission grant issued - {} cannot be rescued", asset);
            }
        }

        Ok(Self {
            protected_account,
            safe_destination,
            token_address,
            grants,
        })
    }

    pub fn protected_account(&self) -> Address {
        self.protected_account
    }

    pub fn safe_destination(&self) -> Address {
        self.safe_destination
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    pub fn grant(&self, asset: AssetKind) -> Option<&PermissionGrant> {
        self.grants.get(asset)
    }

    pub fn grants(&self) -> &GrantSet {
        &self.grants
    }
}
