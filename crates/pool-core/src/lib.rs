//! Transaction coordinator for a mining pool.
//!
//! Producers hand solutions and payouts to a [`PoolCoordinator`]; any number
//! of [`CoordinatorWorker`] replicas then move them onto the ledger through
//! a shared store, keeping at most one pending transaction per class and
//! reconciling every broadcast against its receipt.

pub mod active;
pub mod context;
pub mod engine;
pub mod error;
pub mod keys;
pub mod lease;
pub mod merge_mint;
pub mod params;
pub mod queue;
pub mod reconciler;
pub mod records;
pub mod scheduler;
pub mod stats;
pub mod submitter;

#[cfg(test)]
mod test_utils;

pub use context::{CoordinatorContext, CoordinatorSettings};
pub use engine::CoordinatorWorker;
pub use error::{BroadcastError, BroadcastOutcome, CoreError};
pub use merge_mint::{MergeMintResolver, ProbingMergeMintResolver};

use active::ActiveTransactions;
use params::ChainParameterPoller;
use pool_account::{AccountInterface, AccountService};
use pool_ledger::LedgerInterface;
use pool_storage::{StorageInterface, StorageService};
use pool_types::{
	Address, BroadcastTransaction, ChainParameters, FlaggedRequest, PayoutRecord,
	QueuedTransactionRequest, SolutionPayload, TransactionStatistics, TransferPayload, TxPayload,
	TxStatus, B256, U256,
};
use queue::TransactionQueue;
use records::SubmissionRecords;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use uuid::Uuid;

/// Assembles a [`PoolCoordinator`] from its backends.
pub struct CoordinatorBuilder {
	settings: CoordinatorSettings,
	storage: Option<Box<dyn StorageInterface>>,
	ledger: Option<Arc<dyn LedgerInterface>>,
	minting_account: Option<Box<dyn AccountInterface>>,
	payment_account: Option<Box<dyn AccountInterface>>,
	merge_mint: Option<Arc<dyn MergeMintResolver>>,
}

impl CoordinatorBuilder {
	pub fn new(settings: CoordinatorSettings) -> Self {
		Self {
			settings,
			storage: None,
			ledger: None,
			minting_account: None,
			payment_account: None,
			merge_mint: None,
		}
	}

	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_ledger(mut self, ledger: Arc<dyn LedgerInterface>) -> Self {
		self.ledger = Some(ledger);
		self
	}

	pub fn with_minting_account(mut self, account: Box<dyn AccountInterface>) -> Self {
		self.minting_account = Some(account);
		self
	}

	pub fn with_payment_account(mut self, account: Box<dyn AccountInterface>) -> Self {
		self.payment_account = Some(account);
		self
	}

	/// Overrides the default probing resolver.
	pub fn with_merge_mint_resolver(mut self, resolver: Arc<dyn MergeMintResolver>) -> Self {
		self.merge_mint = Some(resolver);
		self
	}

	pub fn build(self) -> Result<PoolCoordinator, CoreError> {
		let storage = self
			.storage
			.ok_or_else(|| CoreError::Configuration("No storage backend configured".into()))?;
		let ledger = self
			.ledger
			.ok_or_else(|| CoreError::Configuration("No ledger client configured".into()))?;
		let minting_account = self
			.minting_account
			.ok_or_else(|| CoreError::Configuration("No minting account configured".into()))?;
		let payment_account = self
			.payment_account
			.ok_or_else(|| CoreError::Configuration("No payment account configured".into()))?;

		let merge_mint = self.merge_mint.unwrap_or_else(|| {
			Arc::new(ProbingMergeMintResolver::new(
				ledger.clone(),
				self.settings.mint_helper,
				self.settings.merge_mint_candidates.clone(),
				self.settings.gas.ceiling,
			))
		});

		let ctx = Arc::new(CoordinatorContext {
			settings: self.settings,
			storage: Arc::new(StorageService::new(storage)),
			ledger,
			minting_account: Arc::new(AccountService::new(minting_account)),
			payment_account: Arc::new(AccountService::new(payment_account)),
			merge_mint,
		});
		Ok(PoolCoordinator::new(ctx))
	}
}

/// Producer-facing handle: enqueue work, read chain parameters and look up
/// transaction state. Cheap to share; all state lives in the store.
pub struct PoolCoordinator {
	ctx: Arc<CoordinatorContext>,
	queue: TransactionQueue,
	active: ActiveTransactions,
	records: SubmissionRecords,
}

impl PoolCoordinator {
	fn new(ctx: Arc<CoordinatorContext>) -> Self {
		Self {
			// Producers never claim, so the worker id is irrelevant here.
			queue: TransactionQueue::new(ctx.storage.clone(), "producer"),
			active: ActiveTransactions::new(ctx.storage.clone()),
			records: SubmissionRecords::new(ctx.storage.clone()),
			ctx,
		}
	}

	pub fn context(&self) -> &Arc<CoordinatorContext> {
		&self.ctx
	}

	/// Queues a solution for submission. The current mining reward is read
	/// from the token contract and carried with the request.
	pub async fn enqueue_solution(
		&self,
		miner_address: Address,
		solution_number: U256,
		challenge_digest: B256,
		challenge_number: B256,
	) -> Result<Uuid, CoreError> {
		let token_reward = self.ctx.ledger.mining_reward().await?;
		let payload = TxPayload::Solution(SolutionPayload {
			miner_address,
			solution_number,
			challenge_digest,
			challenge_number,
			token_reward,
		});
		self.enqueue(payload).await
	}

	/// Queues a payout. `payment_id` is the idempotency key.
	pub async fn enqueue_transfer(
		&self,
		address_to: Address,
		token_amount: U256,
		payment_id: impl Into<String>,
	) -> Result<Uuid, CoreError> {
		let payload = TxPayload::Transfer(TransferPayload {
			address_to,
			token_amount,
			payment_id: payment_id.into(),
		});
		self.enqueue(payload).await
	}

	async fn enqueue(&self, payload: TxPayload) -> Result<Uuid, CoreError> {
		let block = params::current_block(&self.ctx.storage).await?;
		let request = QueuedTransactionRequest::new(payload, block);
		self.queue.enqueue(&request).await?;
		info!(
			request_id = %request.id,
			class = %request.class(),
			block,
			"Queued transaction"
		);
		Ok(request.id)
	}

	pub async fn current_challenge_number(&self) -> Result<Option<B256>, CoreError> {
		Ok(params::current_challenge(&self.ctx.storage).await?)
	}

	pub async fn current_difficulty(&self) -> Result<U256, CoreError> {
		Ok(self.chain_parameters().await?.difficulty)
	}

	pub async fn current_target(&self) -> Result<U256, CoreError> {
		Ok(self.chain_parameters().await?.target)
	}

	pub async fn last_seen_ledger_block(&self) -> Result<u64, CoreError> {
		Ok(params::current_block(&self.ctx.storage).await?)
	}

	pub async fn chain_parameters(&self) -> Result<ChainParameters, CoreError> {
		Ok(params::read_chain_parameters(&self.ctx.storage).await?)
	}

	/// Status of a broadcast transaction, `None` if the hash was never
	/// recorded.
	pub async fn transaction_status(&self, tx_hash: B256) -> Result<Option<TxStatus>, CoreError> {
		Ok(self
			.active
			.get(&tx_hash)
			.await?
			.map(|entry| entry.value.status))
	}

	pub async fn payout_status(&self, payment_id: &str) -> Result<Option<PayoutRecord>, CoreError> {
		Ok(self.records.payout(payment_id).await?)
	}

	pub async fn statistics(&self) -> Result<TransactionStatistics, CoreError> {
		Ok(stats::collect(&self.ctx.storage, &self.queue, &self.active).await?)
	}

	/// The last `limit` broadcasts, oldest first.
	pub async fn recent_transactions(
		&self,
		limit: usize,
	) -> Result<Vec<BroadcastTransaction>, CoreError> {
		let mut transactions = self.active.all().await?;
		let skip = transactions.len().saturating_sub(limit);
		Ok(transactions.split_off(skip))
	}

	pub async fn lost_transactions(&self) -> Result<Vec<BroadcastTransaction>, CoreError> {
		Ok(self.active.lost().await?)
	}

	/// Requests taken out of circulation and still owed.
	pub async fn failed_requests(&self) -> Result<Vec<FlaggedRequest>, CoreError> {
		Ok(self.queue.failed().await?)
	}

	/// Seeds the recent-challenge window unless a running cluster already
	/// keeps one. Run at service start, before any worker polls.
	pub async fn seed_challenge_window(&self) -> Result<(), CoreError> {
		ChainParameterPoller::new(self.ctx.clone())
			.seed_window()
			.await?;
		Ok(())
	}

	/// Spawns `replicas` workers on `tracker`. Worker ids combine the
	/// instance id with the index, so processes sharing a store never
	/// collide.
	pub fn spawn_workers(
		&self,
		replicas: usize,
		tracker: &TaskTracker,
		token: &CancellationToken,
	) -> Vec<Arc<CoordinatorWorker>> {
		(0..replicas)
			.map(|index| {
				let worker_id = self.ctx.settings.worker_id(index);
				let worker = Arc::new(CoordinatorWorker::new(self.ctx.clone(), worker_id));
				worker.clone().spawn(tracker, token);
				worker
			})
			.collect()
	}
}
