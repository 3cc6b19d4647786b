//! Signing accounts for the pool.
//!
//! The pool signs with two accounts: the minting account submits solutions
//! and the payment account sends payouts. Both sit behind
//! [`AccountInterface`] so the core never touches key material.

use async_trait::async_trait;
use pool_types::{Address, RawTransaction, SignedTransaction};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

pub use implementations::local::LocalWallet;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a fully populated transaction and returns its encoded form
	/// together with the hash the ledger will assign to it.
	async fn sign_transaction(
		&self,
		tx: &RawTransaction,
	) -> Result<SignedTransaction, AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub async fn sign(&self, tx: &RawTransaction) -> Result<SignedTransaction, AccountError> {
		self.provider.sign_transaction(tx).await
	}
}

/// Checks that `key` is 32 bytes of hex, with or without a `0x` prefix.
pub fn validate_private_key(key: &str) -> Result<(), AccountError> {
	let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

	if key_without_prefix.len() != 64 {
		return Err(AccountError::InvalidKey(
			"Private key must be 64 hex characters (32 bytes)".to_string(),
		));
	}

	if hex::decode(key_without_prefix).is_err() {
		return Err(AccountError::InvalidKey(
			"Private key must be valid hexadecimal".to_string(),
		));
	}

	Ok(())
}
