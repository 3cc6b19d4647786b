//! Names of every key the coordinator keeps in the shared store.

use pool_types::{Address, TxClass};

pub const SOLUTION_QUEUE: &str = "queued_transactions:solution";
pub const TRANSFER_QUEUE: &str = "queued_transactions:transfer";
pub const BROADCAST_ATTEMPTS: &str = "broadcast_attempts";
pub const BROADCAST_SLOTS: &str = "broadcast_slots";
pub const WORKER_LEASES: &str = "worker_leases";
pub const FAILED_TRANSACTIONS: &str = "failed_transactions";
/// Raw entries that could not be decoded, kept verbatim.
pub const MALFORMED_TRANSACTIONS: &str = "malformed_transactions";

pub const ACTIVE_TRANSACTIONS: &str = "active_transactions";
pub const ACTIVE_TRANSACTIONS_LIST: &str = "active_transactions_list";
/// Hashes of non-terminal transactions, mapped to their class.
pub const OUTSTANDING_TRANSACTIONS: &str = "outstanding_transactions";
pub const LOST_TRANSACTIONS_LIST: &str = "lost_transactions_list";

pub const BALANCE_TRANSFER: &str = "balance_transfer";
pub const SUBMITTED_SOLUTIONS: &str = "unconfirmed_submitted_solution_tx";

pub const RECENT_CHALLENGES: &str = "recent_challenges";
pub const CHALLENGE_NUMBER: &str = "challengeNumber";
pub const MINING_DIFFICULTY: &str = "miningDifficulty";
pub const MINING_TARGET: &str = "miningTarget";
pub const ETH_BLOCK_NUMBER: &str = "ethBlockNumber";

pub const QUEUED_TX_COUNT: &str = "queuedTxCount";
pub const PENDING_TX_COUNT: &str = "pendingTxCount";
/// Incremented by the transition that settles a transaction.
pub const MINED_TX_COUNT: &str = "minedTxCount";
pub const SUCCESS_TX_COUNT: &str = "successTxCount";
pub const PENDING_MINTS_COUNT: &str = "pendingMintsCount";
pub const PENDING_PAYMENTS_COUNT: &str = "pendingPaymentsCount";

pub fn queue(class: TxClass) -> &'static str {
	match class {
		TxClass::Solution => SOLUTION_QUEUE,
		TxClass::Transfer => TRANSFER_QUEUE,
	}
}

pub fn inflight(worker_id: &str) -> String {
	format!("inflight_transactions:{}", worker_id)
}

/// Per-address payout audit trail.
pub fn balance_transfers(address: &Address) -> String {
	format!("balance_transfers:{}", address)
}
