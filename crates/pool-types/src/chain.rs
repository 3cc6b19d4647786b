//! Chain-side types: mining parameters, ledger records and receipts.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Snapshot of the token contract's mining parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
	pub difficulty: U256,
	pub target: U256,
	/// Current challenge, once one has been observed.
	pub challenge_number: Option<B256>,
	pub last_seen_ledger_block: u64,
}

/// Status flag of a receipt as reported by a node.
///
/// Nodes disagree on the encoding: some report a JSON boolean, others a
/// hex quantity such as `"0x1"`. Both normalize to the same answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceiptStatus {
	Flag(bool),
	Encoded(String),
}

impl ReceiptStatus {
	/// True iff the status normalizes to the ledger's success value `1`.
	pub fn is_success(&self) -> bool {
		match self {
			ReceiptStatus::Flag(flag) => *flag,
			ReceiptStatus::Encoded(raw) => {
				let trimmed = raw.trim();
				let digits = trimmed
					.strip_prefix("0x")
					.or_else(|| trimmed.strip_prefix("0X"))
					.unwrap_or(trimmed);
				matches!(u64::from_str_radix(digits, 16), Ok(1))
			}
		}
	}
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
	pub tx_hash: B256,
	pub block_number: Option<u64>,
	pub status: ReceiptStatus,
}

impl LedgerReceipt {
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}
}

/// The ledger's view of a transaction it knows about, mined or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
	pub tx_hash: B256,
	/// Block the transaction was mined in, `None` while in the mempool.
	pub block_number: Option<u64>,
	pub nonce: u64,
}

/// A contract call used for gas estimation and read-only calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
	pub from: Address,
	pub to: Address,
	pub data: Bytes,
	pub value: U256,
	/// Gas allowance for the estimate.
	pub gas: Option<u64>,
}

impl CallRequest {
	pub fn new(from: Address, to: Address, data: Bytes) -> Self {
		Self {
			from,
			to,
			data,
			value: U256::ZERO,
			gas: None,
		}
	}

	pub fn with_gas(mut self, gas: u64) -> Self {
		self.gas = Some(gas);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_receipt_status_normalization() {
		assert!(ReceiptStatus::Flag(true).is_success());
		assert!(!ReceiptStatus::Flag(false).is_success());
		assert!(ReceiptStatus::Encoded("0x1".into()).is_success());
		assert!(ReceiptStatus::Encoded("0x01".into()).is_success());
		assert!(!ReceiptStatus::Encoded("0x0".into()).is_success());
		assert!(!ReceiptStatus::Encoded("garbage".into()).is_success());
	}

	#[test]
	fn test_receipt_status_deserializes_both_encodings() {
		let flag: ReceiptStatus = serde_json::from_str("true").unwrap();
		assert_eq!(flag, ReceiptStatus::Flag(true));

		let encoded: ReceiptStatus = serde_json::from_str("\"0x1\"").unwrap();
		assert!(encoded.is_success());
	}
}
