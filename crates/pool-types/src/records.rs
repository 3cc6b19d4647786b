//! Audit records written next to the active-transaction table.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payout record, keyed by payment id.
///
/// `confirmed` flips to true once the transfer is mined successfully; the
/// scheduler refuses to pay a confirmed payment id again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
	pub address_to: Address,
	pub payment_id: String,
	pub token_amount: U256,
	pub tx_hash: Option<B256>,
	pub block: u64,
	pub confirmed: bool,
}

/// Solution submission record, keyed by transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedSolution {
	pub tx_hash: B256,
	pub miner_address: Address,
	pub challenge_number: B256,
	pub token_reward: U256,
	pub merge_mint_addresses: Vec<Address>,
	pub block: u64,
}

/// Written after signing and before sending, so a crash between the two
/// still leaves the hash of what may have reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAttempt {
	pub request_id: Uuid,
	pub tx_hash: B256,
	pub sender: Address,
	pub nonce: u64,
	pub worker_id: String,
	/// Unix millis.
	pub attempted_at: u64,
}

/// A request taken out of circulation, kept for manual recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedRequest {
	pub request: crate::QueuedTransactionRequest,
	pub reason: String,
	/// Unix millis.
	pub flagged_at: u64,
}

/// Liveness record of one worker, refreshed on every broadcast tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLease {
	/// Unix millis.
	pub heartbeat_at: u64,
}

/// Holder of a per-class broadcast slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLease {
	pub owner: String,
	/// Unix millis.
	pub acquired_at: u64,
}
