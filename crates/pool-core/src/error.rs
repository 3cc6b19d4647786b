use pool_account::AccountError;
use pool_ledger::LedgerError;
use pool_storage::StorageError;
use pool_types::TxClass;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Account error: {0}")]
	Account(#[from] AccountError),

	#[error("Shutdown error: {0}")]
	Shutdown(String),
}

/// Reasons a broadcast attempt did not produce a pending transaction.
#[derive(Error, Debug)]
pub enum BroadcastError {
	/// The ledger could not be reached. Nothing changed; retry next tick.
	#[error("RPC unavailable: {0}")]
	RpcUnavailable(String),

	#[error("Gas estimate {estimate} exceeds ceiling {ceiling}")]
	GasEstimateExceeded { estimate: u64, ceiling: u64 },

	/// Signing or submission returned no identifier.
	#[error("Submission rejected: {0}")]
	SubmissionRejected(String),

	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<LedgerError> for BroadcastError {
	fn from(e: LedgerError) -> Self {
		match e {
			LedgerError::Unavailable(msg) => BroadcastError::RpcUnavailable(msg),
			LedgerError::Rejected(msg) | LedgerError::Decode(msg) => {
				BroadcastError::SubmissionRejected(msg)
			}
		}
	}
}

impl BroadcastError {
	/// Whether the failure counts against the request's attempt budget.
	pub fn consumes_attempt(&self) -> bool {
		!matches!(
			self,
			BroadcastError::RpcUnavailable(_) | BroadcastError::Storage(_)
		)
	}
}

/// What a single scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
	/// Both class queues are empty.
	Idle,
	/// The head's class already has a pending transaction or its broadcast
	/// slot is held by another worker.
	Blocked(TxClass),
	/// The head is waiting out its retry backoff.
	Backoff(TxClass),
	Broadcast(pool_types::B256),
	/// A previously signed attempt was found on the ledger and recorded
	/// instead of signing again.
	Adopted(pool_types::B256),
	/// The payout is already confirmed; the request was dropped.
	DuplicatePayout(String),
	/// The attempt failed and the request went back to the head of its
	/// class.
	Requeued(TxClass),
	/// The request was moved to the failed list.
	Flagged(TxClass),
}
