//! Table of every transaction the ledger has accepted.
//!
//! Records are keyed by transaction hash and never deleted. Status changes
//! go through compare-and-set on the stored record, so two workers racing
//! on the same transaction apply a transition exactly once.
//!
//! Two indexes sit next to the table: an append-only list of hashes in
//! broadcast order, and the set of hashes not yet in a terminal status.
//! Scheduling and reconciliation only ever walk the second one.

use crate::keys;
use pool_storage::{Entry, StorageError, StorageService};
use pool_types::{BroadcastTransaction, TxClass, TxStatus, B256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ActiveTransactions {
	storage: Arc<StorageService>,
}

impl ActiveTransactions {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Records a newly accepted transaction and indexes it.
	///
	/// Returns false without touching the indexes if the hash is already
	/// recorded.
	pub async fn record(&self, tx: &BroadcastTransaction) -> Result<bool, StorageError> {
		let key = tx.tx_hash.to_string();
		if !self
			.storage
			.hash_set_if_absent(keys::ACTIVE_TRANSACTIONS, &key, tx)
			.await?
		{
			debug!(tx_hash = %key, "Transaction already recorded");
			return Ok(false);
		}
		let backend = self.storage.backend();
		if !tx.status.is_terminal() {
			backend
				.hash_set(keys::OUTSTANDING_TRANSACTIONS, &key, tx.class().as_str())
				.await?;
		}
		backend
			.list_push_back(keys::ACTIVE_TRANSACTIONS_LIST, &key)
			.await?;
		Ok(true)
	}

	pub async fn get(
		&self,
		hash: &B256,
	) -> Result<Option<Entry<BroadcastTransaction>>, StorageError> {
		self.storage
			.hash_get(keys::ACTIVE_TRANSACTIONS, &hash.to_string())
			.await
	}

	/// Every recorded transaction in broadcast order.
	pub async fn all(&self) -> Result<Vec<BroadcastTransaction>, StorageError> {
		let mut transactions = Vec::new();
		for raw in self
			.storage
			.backend()
			.list_range(keys::ACTIVE_TRANSACTIONS_LIST)
			.await?
		{
			let Ok(hash) = B256::from_str(&raw) else {
				warn!(entry = %raw, "Skipping malformed index entry");
				continue;
			};
			if let Some(entry) = self.get(&hash).await? {
				transactions.push(entry.value);
			}
		}
		Ok(transactions)
	}

	/// Records that have not reached a terminal status, optionally limited
	/// to one class.
	async fn unsettled(
		&self,
		class: Option<TxClass>,
	) -> Result<Vec<Entry<BroadcastTransaction>>, StorageError> {
		let backend = self.storage.backend();
		let mut entries = Vec::new();
		for (hash, indexed_class) in backend.hash_entries(keys::OUTSTANDING_TRANSACTIONS).await? {
			if class.is_some_and(|class| class.as_str() != indexed_class) {
				continue;
			}
			let entry = match B256::from_str(&hash) {
				Ok(parsed) => self.get(&parsed).await?,
				Err(_) => None,
			};
			match entry {
				Some(entry) if !entry.value.status.is_terminal() => entries.push(entry),
				// Settled by a transition that stopped before unindexing.
				_ => {
					backend
						.hash_delete(keys::OUTSTANDING_TRANSACTIONS, &hash)
						.await?
				}
			}
		}
		Ok(entries)
	}

	pub async fn outstanding(&self) -> Result<Vec<Entry<BroadcastTransaction>>, StorageError> {
		self.unsettled(None).await
	}

	pub async fn pending(
		&self,
		class: TxClass,
	) -> Result<Vec<BroadcastTransaction>, StorageError> {
		Ok(self
			.unsettled(Some(class))
			.await?
			.into_iter()
			.map(|entry| entry.value)
			.filter(|tx| tx.status == TxStatus::Pending)
			.collect())
	}

	pub async fn has_pending(&self, class: TxClass) -> Result<bool, StorageError> {
		Ok(!self.pending(class).await?.is_empty())
	}

	/// Moves `current` to `next` if the stored record is still exactly
	/// `current`. Returns true if this call made the change.
	///
	/// The call that settles a transaction also unindexes it and bumps the
	/// mined and success counters.
	pub async fn transition(
		&self,
		current: &Entry<BroadcastTransaction>,
		next: TxStatus,
	) -> Result<bool, StorageError> {
		if !current.value.status.can_transition_to(next) {
			return Ok(false);
		}
		let key = current.value.tx_hash.to_string();
		let updated = current.value.with_status(next);
		if !self
			.storage
			.hash_compare_and_set(keys::ACTIVE_TRANSACTIONS, &key, &current.raw, &updated)
			.await?
		{
			return Ok(false);
		}

		if next.is_terminal() {
			self.storage
				.hash_delete(keys::OUTSTANDING_TRANSACTIONS, &key)
				.await?;
		}
		match next {
			TxStatus::MinedSuccess => {
				self.storage.increment(keys::MINED_TX_COUNT, 1).await?;
				self.storage.increment(keys::SUCCESS_TX_COUNT, 1).await?;
			}
			TxStatus::MinedFailed => {
				self.storage.increment(keys::MINED_TX_COUNT, 1).await?;
			}
			_ => {}
		}
		Ok(true)
	}

	pub async fn append_lost(&self, tx: &BroadcastTransaction) -> Result<(), StorageError> {
		self.storage
			.push_back(keys::LOST_TRANSACTIONS_LIST, tx)
			.await
	}

	pub async fn lost(&self) -> Result<Vec<BroadcastTransaction>, StorageError> {
		Ok(self
			.storage
			.range::<BroadcastTransaction>(keys::LOST_TRANSACTIONS_LIST)
			.await?
			.into_iter()
			.map(|entry| entry.value)
			.collect())
	}

	pub async fn lost_count(&self) -> Result<usize, StorageError> {
		self.storage.len(keys::LOST_TRANSACTIONS_LIST).await
	}
}
