//! Transaction statistics over the queue and the active table.
//!
//! Pending counts come from the outstanding index and settled counts from
//! the counters the settling transition bumps, so collecting never walks
//! the full history.

use crate::active::ActiveTransactions;
use crate::keys;
use crate::queue::TransactionQueue;
use pool_storage::{StorageError, StorageService};
use pool_types::{TransactionStatistics, TxClass};

pub async fn collect(
	storage: &StorageService,
	queue: &TransactionQueue,
	active: &ActiveTransactions,
) -> Result<TransactionStatistics, StorageError> {
	let pending_mints_count = active.pending(TxClass::Solution).await?.len();
	let pending_payments_count = active.pending(TxClass::Transfer).await?.len();
	let counter = |value: i64| usize::try_from(value).unwrap_or(0);

	Ok(TransactionStatistics {
		queued_count: queue.queued_len().await?,
		pending_count: pending_mints_count + pending_payments_count,
		mined_count: counter(storage.counter(keys::MINED_TX_COUNT).await?),
		success_count: counter(storage.counter(keys::SUCCESS_TX_COUNT).await?),
		lost_count: active.lost_count().await?,
		pending_mints_count,
		pending_payments_count,
	})
}

/// Writes the derived counts. The mined and success counters are owned by
/// [`ActiveTransactions::transition`] and left alone.
pub async fn persist(
	storage: &StorageService,
	stats: &TransactionStatistics,
) -> Result<(), StorageError> {
	for (key, value) in [
		(keys::QUEUED_TX_COUNT, stats.queued_count),
		(keys::PENDING_TX_COUNT, stats.pending_count),
		(keys::PENDING_MINTS_COUNT, stats.pending_mints_count),
		(keys::PENDING_PAYMENTS_COUNT, stats.pending_payments_count),
	] {
		storage.set(key, &value.to_string()).await?;
	}
	Ok(())
}
