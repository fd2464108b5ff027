//! Chain access - balance reads over JSON-RPC

pub mod erc20;
pub mod reader;
pub mod rpc;

pub use reader::{ChainReader, JsonRpcChainReader};
pub use rpc::JsonRpcClient;
