//! ERC-20 ABI bindings used by the guardian
//!
//! Only the two calls we need: reading a balance and sweeping it.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::error::{Error, Result};

sol! {
    function balanceOf(address account) external view returns (uint256 balance);
    function transfer(address to, uint256 amount) external returns (bool success);
}

/// Calldata for `balanceOf(account)`
pub fn balance_of_calldata(account: Address) -> Bytes {
    Bytes::from(balanceOfCall { account }.abi_encode())
}

/// Decode the return data of `balanceOf`
pub fn decode_balance_of(data: &[u8]) -> Result<U256> {
    balanceOfCall::abi_decode_returns(data, true)
        .map(|r| r.balance)
        .map_err(|e| Error::Deserialization(format!("Bad balanceOf return data: {}", e)))
}

/// Calldata for `transfer(to, amount)`
pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    Bytes::from(transferCall { to, amount }.abi_encode())
}
