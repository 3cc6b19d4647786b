//! Shared types for the mining-pool transaction coordinator.
//!
//! Every crate in the workspace speaks in terms of these types: the queue
//! stores [`QueuedTransactionRequest`]s, the active ledger stores
//! [`BroadcastTransaction`]s, and the ledger client returns receipts and
//! chain parameters defined here.

pub mod abi;
pub mod account;
pub mod chain;
pub mod records;
pub mod transaction;

pub use account::*;
pub use chain::*;
pub use records::*;
pub use transaction::*;

pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Truncates a transaction hash for display in log lines.
pub fn short_hash(hash: &B256) -> String {
	let hash_str = hex::encode(hash.as_slice());
	format!("0x{}..", &hash_str[..8])
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
	chrono::Utc::now().timestamp_millis().max(0) as u64
}
