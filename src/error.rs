//! Error types for the guardian

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the guardian
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("RPC request rejected: {0}")]
    RpcRejected(String),

    // Chain read errors
    #[error("Balance read failed: {0}")]
    ReadFailure(String),

    // Permission grant errors
    #[error("Invalid permission grant: {0}")]
    InvalidGrant(String),

    #[error("Permission grant for {asset} expired at {expiry}")]
    GrantExpired { asset: String, expiry: String },

    #[error("No permission grant issued for {0}")]
    GrantMissing(String),

    // Delegated execution errors
    #[error("Execution rejected: {0}")]
    ExecutionRejected(String),

    #[error("Confirmation timeout after {0}ms")]
    ConfirmationTimeout(u64),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient transport failure)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::RpcConnection(_)
        )
    }

    /// Check if this error means the grant itself cannot authorize a rescue
    pub fn is_grant_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidGrant(_) | Error::GrantExpired { .. } | Error::GrantMissing(_)
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::RpcConnection(e.to_string())
        } else {
            Error::Rpc(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
