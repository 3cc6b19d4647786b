//! Local private-key wallet.
//!
//! Keys are read from configuration at startup and held in memory only.
//! Transactions are signed as legacy (EIP-155) transactions, which every
//! network the pool targets accepts.

use crate::{AccountError, AccountInterface};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::TxKind;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use pool_types::{Address, RawTransaction, SignedTransaction};

/// Local wallet implementation using Alloy's signer.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a new LocalWallet from a hex-encoded private key.
	///
	/// The private key should be provided as a hex string (with or without 0x prefix).
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		crate::validate_private_key(private_key_hex)?;
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_transaction(
		&self,
		tx: &RawTransaction,
	) -> Result<SignedTransaction, AccountError> {
		let mut legacy_tx = TxLegacy {
			chain_id: Some(tx.chain_id),
			nonce: tx.nonce,
			gas_price: tx.gas_price,
			gas_limit: tx.gas_limit,
			to: TxKind::Call(tx.to),
			value: tx.value,
			input: tx.data.clone(),
		};

		let signature = self
			.signer
			.sign_transaction(&mut legacy_tx)
			.await
			.map_err(|e| {
				AccountError::SigningFailed(format!("Failed to sign transaction: {}", e))
			})?;

		let signed = legacy_tx.into_signed(signature);
		let hash = *signed.hash();
		let envelope = TxEnvelope::from(signed);

		Ok(SignedTransaction {
			hash,
			raw: envelope.encoded_2718().into(),
		})
	}
}
