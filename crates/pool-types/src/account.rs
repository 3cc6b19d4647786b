//! Transaction types exchanged with signing accounts.

use alloy_primitives::{Address, Bytes, B256, U256};

/// Unsigned legacy transaction, fully populated by the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
	/// Chain ID for replay protection.
	pub chain_id: u64,
	/// The sender's transaction count at build time.
	pub nonce: u64,
	pub gas_limit: u64,
	/// Gas price in wei.
	pub gas_price: u128,
	pub to: Address,
	/// Native value. Pool transactions always send zero.
	pub value: U256,
	/// ABI-encoded calldata.
	pub data: Bytes,
}

/// A signed, encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	/// Hash of the signed transaction. Known before submission.
	pub hash: B256,
	/// EIP-2718 encoded bytes.
	pub raw: Bytes,
}
