//! Ledger RPC client used by the pool coordinator.
//!
//! The coordinator only observes the ledger through this interface: mining
//! parameters of the token contract, account nonces, gas pricing, and the
//! transaction/receipt lookups that drive reconciliation.

use async_trait::async_trait;
use pool_types::{
	Address, Bytes, CallRequest, LedgerReceipt, LedgerTransaction, B256, U256,
};
use thiserror::Error;

pub mod implementations {
	pub mod alloy;
}

pub use implementations::alloy::AlloyLedger;

/// Errors returned by ledger clients.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// The node could not be reached or returned a transport failure.
	#[error("Ledger unavailable: {0}")]
	Unavailable(String),
	/// The node answered with an error, e.g. a revert or a rejected
	/// transaction.
	#[error("Rejected by ledger: {0}")]
	Rejected(String),
	#[error("Decode error: {0}")]
	Decode(String),
}

#[async_trait]
pub trait LedgerInterface: Send + Sync {
	async fn mining_difficulty(&self) -> Result<U256, LedgerError>;

	async fn mining_target(&self) -> Result<U256, LedgerError>;

	async fn challenge_number(&self) -> Result<B256, LedgerError>;

	/// Reward, in token base units, for the next successful mint.
	async fn mining_reward(&self) -> Result<U256, LedgerError>;

	async fn block_number(&self) -> Result<u64, LedgerError>;

	/// Number of transactions sent from `address`, which is also its next
	/// nonce.
	async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

	/// Current network gas price in wei.
	async fn gas_price(&self) -> Result<u128, LedgerError>;

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError>;

	/// Looks up a transaction by hash, mined or still in the mempool.
	async fn transaction(&self, hash: B256) -> Result<Option<LedgerTransaction>, LedgerError>;

	async fn transaction_receipt(&self, hash: B256) -> Result<Option<LedgerReceipt>, LedgerError>;

	/// Broadcasts signed, encoded transaction bytes.
	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, LedgerError>;
}
