//! Receipt reconciliation.
//!
//! Every non-terminal transaction is checked against the ledger. A receipt
//! settles it as mined; a pending transaction with no receipt that is older
//! than the lost-block threshold is declared lost. Transitions go through
//! compare-and-set, so concurrent reconcilers apply each one once.
//!
//! A node error on one transaction is logged and skipped so the rest are
//! still settled. Store failures and an unreachable ledger end the pass.

use crate::active::ActiveTransactions;
use crate::context::CoordinatorContext;
use crate::error::CoreError;
use crate::params;
use crate::records::SubmissionRecords;
use pool_ledger::LedgerError;
use pool_storage::Entry;
use pool_types::{short_hash, BroadcastTransaction, TxPayload, TxStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts of what a reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
	pub checked: usize,
	pub mined: usize,
	pub lost: usize,
}

pub struct Reconciler {
	ctx: Arc<CoordinatorContext>,
	active: ActiveTransactions,
	records: SubmissionRecords,
}

impl Reconciler {
	pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
		Self {
			active: ActiveTransactions::new(ctx.storage.clone()),
			records: SubmissionRecords::new(ctx.storage.clone()),
			ctx,
		}
	}

	pub async fn tick(&self) -> Result<ReconcileSummary, CoreError> {
		let current_block = params::current_block(&self.ctx.storage).await?;
		let mut summary = ReconcileSummary::default();

		for entry in self.active.outstanding().await? {
			summary.checked += 1;
			match self.reconcile(&entry, current_block).await {
				Ok(Some(TxStatus::Lost)) => summary.lost += 1,
				Ok(Some(_)) => summary.mined += 1,
				Ok(None) => {}
				Err(CoreError::Ledger(LedgerError::Rejected(e) | LedgerError::Decode(e))) => {
					warn!(
						tx_hash = %short_hash(&entry.value.tx_hash),
						error = %e,
						"Skipping transaction this pass"
					);
				}
				Err(e) => return Err(e),
			}
		}

		if summary.mined > 0 || summary.lost > 0 {
			info!(
				checked = summary.checked,
				mined = summary.mined,
				lost = summary.lost,
				"Reconciled transactions"
			);
		}
		Ok(summary)
	}

	/// Returns the status this call moved the transaction to, if any.
	async fn reconcile(
		&self,
		entry: &Entry<BroadcastTransaction>,
		current_block: u64,
	) -> Result<Option<TxStatus>, CoreError> {
		let tx = &entry.value;
		let ledger = &self.ctx.ledger;

		if let Some(receipt) = ledger.transaction_receipt(tx.tx_hash).await? {
			let next = TxStatus::from_receipt(receipt.is_success());

			// Confirm first so a crash after the swap never leaves a mined
			// payout unconfirmed.
			if let (TxStatus::MinedSuccess, TxPayload::Transfer(transfer)) = (next, &tx.payload) {
				self.records.confirm_payout(&transfer.payment_id).await?;
			}

			if !self.active.transition(entry, next).await? {
				return Ok(None);
			}
			info!(
				tx_hash = %short_hash(&tx.tx_hash),
				class = %tx.class(),
				status = %next,
				block = ?receipt.block_number,
				"Transaction mined"
			);
			return Ok(Some(next));
		}

		if tx.status != TxStatus::Pending || tx.broadcast_block == 0 {
			return Ok(None);
		}

		let age = current_block.saturating_sub(tx.broadcast_block);
		if age <= self.ctx.settings.coordinator.lost_block_threshold {
			if let Ok(Some(seen)) = ledger.transaction(tx.tx_hash).await {
				debug!(
					tx_hash = %short_hash(&tx.tx_hash),
					in_mempool = seen.block_number.is_none(),
					age,
					"Awaiting receipt"
				);
			}
			return Ok(None);
		}

		if !self.active.transition(entry, TxStatus::Lost).await? {
			return Ok(None);
		}
		self.active.append_lost(&tx.with_status(TxStatus::Lost)).await?;
		warn!(
			tx_hash = %short_hash(&tx.tx_hash),
			class = %tx.class(),
			broadcast_block = tx.broadcast_block,
			current_block,
			"Transaction lost"
		);
		Ok(Some(TxStatus::Lost))
	}
}
