//! Aegis Guardian Library
//!
//! Watches a protected account's native and token balances and, when one
//! is drained below its floor, sweeps what remains to a safe destination
//! through a pre-issued delegated permission.

pub mod chain;
pub mod cli;
pub mod config;
pub mod delegation;
pub mod error;
pub mod guardian;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
