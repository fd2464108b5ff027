//! Delegated execution
//!
//! Everything needed to move funds without the owner's live signature:
//!
//! ```text
//! GrantSet (grants.json) → PermissionGrant → RescueIntent → DelegatedExecutor
//!                                                              ├─ RelayerExecutor
//!                                                              └─ DryRunExecutor
//! ```
//!
//! The delegation context inside a grant is an opaque signed credential.
//! It is forwarded verbatim and never decoded here.

pub mod executor;
pub mod grant;
pub mod relayer;

pub use executor::{DelegatedCall, DelegatedExecutor, DryRunExecutor, RescueIntent};
pub use grant::{GrantSet, PermissionGrant, SignerMeta};
pub use relayer::RelayerExecutor;
