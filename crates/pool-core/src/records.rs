//! Payout and solution audit records.

use crate::keys;
use pool_storage::{StorageError, StorageService};
use pool_types::{PayoutRecord, SubmittedSolution};
use std::sync::Arc;
use tracing::info;

pub struct SubmissionRecords {
	storage: Arc<StorageService>,
}

impl SubmissionRecords {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Stores the payout under its payment id and appends it to the
	/// recipient's audit trail.
	pub async fn record_payout(&self, record: &PayoutRecord) -> Result<(), StorageError> {
		self.storage
			.push_back(&keys::balance_transfers(&record.address_to), record)
			.await?;
		self.storage
			.hash_set(keys::BALANCE_TRANSFER, &record.payment_id, record)
			.await
	}

	pub async fn payout(&self, payment_id: &str) -> Result<Option<PayoutRecord>, StorageError> {
		Ok(self
			.storage
			.hash_get(keys::BALANCE_TRANSFER, payment_id)
			.await?
			.map(|entry| entry.value))
	}

	/// True once a transfer for `payment_id` has mined successfully.
	pub async fn is_payout_confirmed(&self, payment_id: &str) -> Result<bool, StorageError> {
		Ok(self
			.payout(payment_id)
			.await?
			.is_some_and(|record| record.tx_hash.is_some() && record.confirmed))
	}

	pub async fn confirm_payout(&self, payment_id: &str) -> Result<(), StorageError> {
		let Some(entry) = self
			.storage
			.hash_get::<PayoutRecord>(keys::BALANCE_TRANSFER, payment_id)
			.await?
		else {
			return Ok(());
		};
		if entry.value.confirmed {
			return Ok(());
		}
		let confirmed = PayoutRecord {
			confirmed: true,
			..entry.value
		};
		// Losing the swap means another worker confirmed it first.
		if self
			.storage
			.hash_compare_and_set(keys::BALANCE_TRANSFER, payment_id, &entry.raw, &confirmed)
			.await?
		{
			info!(payment_id, "Payout confirmed");
		}
		Ok(())
	}

	pub async fn record_solution(&self, record: &SubmittedSolution) -> Result<(), StorageError> {
		self.storage
			.hash_set(
				keys::SUBMITTED_SOLUTIONS,
				&record.tx_hash.to_string(),
				record,
			)
			.await
	}

	pub async fn solutions(&self) -> Result<Vec<SubmittedSolution>, StorageError> {
		Ok(self
			.storage
			.hash_entries::<SubmittedSolution>(keys::SUBMITTED_SOLUTIONS)
			.await?
			.into_iter()
			.map(|(_, entry)| entry.value)
			.collect())
	}
}
