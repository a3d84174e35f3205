pub mod balance_cache;
pub mod rpc_client;

pub use balance_cache::{BalanceCacheRepository, BalanceSnapshot};
pub use rpc_client::{BatchRpcClient, RpcCall, RpcCallError};
