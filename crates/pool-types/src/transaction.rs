//! Transaction types for the queue and the active-transaction ledger.
//!
//! A request starts life as a [`QueuedTransactionRequest`] in one of the two
//! class queues. Once the ledger accepts it, it becomes a
//! [`BroadcastTransaction`] whose [`TxStatus`] only ever moves forward.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The two kinds of outgoing transaction the pool broadcasts.
///
/// Solutions take precedence over transfers whenever both are queued,
/// because a solution is only worth anything while its challenge is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxClass {
	/// Mined-solution submission to the mint helper contract.
	Solution,
	/// Token payout from the pool's payment account.
	Transfer,
}

impl TxClass {
	/// All classes in broadcast priority order.
	pub const ALL: [TxClass; 2] = [TxClass::Solution, TxClass::Transfer];

	pub fn as_str(&self) -> &'static str {
		match self {
			TxClass::Solution => "solution",
			TxClass::Transfer => "transfer",
		}
	}
}

impl fmt::Display for TxClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Lifecycle status of a pool transaction.
///
/// Valid moves are `Queued -> Pending` and `Pending -> {MinedSuccess,
/// MinedFailed, Lost}`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
	Queued,
	Pending,
	MinedSuccess,
	MinedFailed,
	Lost,
}

impl TxStatus {
	/// Returns true once the status can no longer change.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			TxStatus::MinedSuccess | TxStatus::MinedFailed | TxStatus::Lost
		)
	}

	/// Returns true if moving from `self` to `next` is a legal transition.
	pub fn can_transition_to(&self, next: TxStatus) -> bool {
		matches!(
			(self, next),
			(TxStatus::Queued, TxStatus::Pending)
				| (TxStatus::Pending, TxStatus::MinedSuccess)
				| (TxStatus::Pending, TxStatus::MinedFailed)
				| (TxStatus::Pending, TxStatus::Lost)
		)
	}

	/// Maps a receipt's normalized success flag to a terminal status.
	pub fn from_receipt(success: bool) -> Self {
		if success {
			TxStatus::MinedSuccess
		} else {
			TxStatus::MinedFailed
		}
	}
}

impl fmt::Display for TxStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TxStatus::Queued => "queued",
			TxStatus::Pending => "pending",
			TxStatus::MinedSuccess => "mined_success",
			TxStatus::MinedFailed => "mined_failed",
			TxStatus::Lost => "lost",
		};
		f.write_str(s)
	}
}

/// A miner's solution, queued for submission to the mint helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionPayload {
	/// Miner credited with the share that found the solution.
	pub miner_address: Address,
	/// The proof-of-work nonce.
	pub solution_number: U256,
	pub challenge_digest: B256,
	/// Challenge the solution was found for. Compared against the live
	/// challenge right before broadcast.
	pub challenge_number: B256,
	/// Block reward read from the token contract at enqueue time.
	pub token_reward: U256,
}

/// A payout owed to a miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
	pub address_to: Address,
	pub token_amount: U256,
	/// Idempotency key for the payout. One payment id is paid at most once.
	pub payment_id: String,
}

/// Class-tagged payload of a pool transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxPayload {
	Solution(SolutionPayload),
	Transfer(TransferPayload),
}

impl TxPayload {
	pub fn class(&self) -> TxClass {
		match self {
			TxPayload::Solution(_) => TxClass::Solution,
			TxPayload::Transfer(_) => TxClass::Transfer,
		}
	}
}

/// A transaction request waiting in a class queue.
///
/// The payload never changes after creation. The remaining fields are retry
/// bookkeeping that the scheduler rewrites when it hands a failed request
/// back to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTransactionRequest {
	/// Unique request id, used to key broadcast attempts.
	pub id: Uuid,
	pub payload: TxPayload,
	/// Ledger height known when the request was enqueued.
	pub enqueued_at_block: u64,
	/// Number of failed broadcast attempts so far.
	#[serde(default)]
	pub attempts: u32,
	/// Unix millis before which the request must not be broadcast again.
	#[serde(default)]
	pub retry_after: Option<u64>,
	/// Hash of the last signed attempt, checked against the ledger before
	/// any retry so an accepted transaction is never signed twice.
	#[serde(default)]
	pub last_attempt_hash: Option<B256>,
}

impl QueuedTransactionRequest {
	pub fn new(payload: TxPayload, enqueued_at_block: u64) -> Self {
		Self {
			id: Uuid::new_v4(),
			payload,
			enqueued_at_block,
			attempts: 0,
			retry_after: None,
			last_attempt_hash: None,
		}
	}

	pub fn class(&self) -> TxClass {
		self.payload.class()
	}

	/// Returns true if the request may be broadcast at `now_ms`.
	pub fn is_eligible_at(&self, now_ms: u64) -> bool {
		self.retry_after.map_or(true, |after| now_ms >= after)
	}
}

/// A transaction the ledger has accepted.
///
/// Records are never deleted; terminal ones stay in the table for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTransaction {
	pub tx_hash: B256,
	/// Request this transaction was built from.
	pub request_id: Uuid,
	pub payload: TxPayload,
	pub sender: Address,
	pub nonce: u64,
	/// Ledger height at broadcast time. Zero means the height was unknown,
	/// which disables lost-transaction detection for this record.
	pub broadcast_block: u64,
	pub status: TxStatus,
}

impl BroadcastTransaction {
	pub fn class(&self) -> TxClass {
		self.payload.class()
	}

	/// Returns a copy carrying `status`.
	pub fn with_status(&self, status: TxStatus) -> Self {
		Self {
			status,
			..self.clone()
		}
	}
}

/// Counts over the queue and the active-transaction table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatistics {
	pub queued_count: usize,
	pub pending_count: usize,
	pub mined_count: usize,
	pub success_count: usize,
	pub lost_count: usize,
	pub pending_mints_count: usize,
	pub pending_payments_count: usize,
}

impl TransactionStatistics {
	/// Number of pending broadcasts of the given class.
	pub fn pending_for(&self, class: TxClass) -> usize {
		match class {
			TxClass::Solution => self.pending_mints_count,
			TxClass::Transfer => self.pending_payments_count,
		}
	}
}
