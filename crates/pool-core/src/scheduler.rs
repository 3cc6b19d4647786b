//! Broadcast scheduler.
//!
//! Each tick moves at most one request from the queue to the ledger. A
//! class is only broadcast when it has no pending transaction, and the
//! per-class broadcast slot keeps two workers from passing that check at
//! the same time.

use crate::active::ActiveTransactions;
use crate::context::CoordinatorContext;
use crate::error::{BroadcastError, BroadcastOutcome, CoreError};
use crate::keys;
use crate::lease::WorkerLeases;
use crate::params;
use crate::queue::TransactionQueue;
use crate::records::SubmissionRecords;
use crate::stats;
use crate::submitter::Submitter;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use pool_storage::{Entry, StorageError};
use pool_types::{
	now_millis, short_hash, Address, BroadcastAttempt, BroadcastTransaction, PayoutRecord,
	QueuedTransactionRequest, SubmittedSolution, TxClass, TxPayload, TxStatus, B256,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Claimed = Entry<QueuedTransactionRequest>;

pub struct BroadcastScheduler {
	ctx: Arc<CoordinatorContext>,
	worker_id: String,
	queue: TransactionQueue,
	active: ActiveTransactions,
	records: SubmissionRecords,
	submitter: Submitter,
	leases: WorkerLeases,
}

impl BroadcastScheduler {
	/// `worker_id` must be unique among every worker sharing the store.
	pub fn new(ctx: Arc<CoordinatorContext>, worker_id: &str) -> Self {
		Self {
			queue: TransactionQueue::new(ctx.storage.clone(), worker_id),
			active: ActiveTransactions::new(ctx.storage.clone()),
			records: SubmissionRecords::new(ctx.storage.clone()),
			submitter: Submitter::new(ctx.clone()),
			leases: WorkerLeases::new(
				ctx.storage.clone(),
				worker_id,
				ctx.settings.coordinator.lease_timeout_ms,
			),
			worker_id: worker_id.to_string(),
			ctx,
		}
	}

	pub async fn tick(&self) -> Result<BroadcastOutcome, CoreError> {
		self.recover_orphans().await?;

		let stats = stats::collect(&self.ctx.storage, &self.queue, &self.active).await?;
		stats::persist(&self.ctx.storage, &stats).await?;

		// Solutions go first. A solution head waiting on a pending solution
		// holds back transfers too; one waiting out its retry delay does not.
		let mut backoff = None;
		for class in TxClass::ALL {
			let Some(head) = self.queue.peek(class).await? else {
				continue;
			};
			if stats.pending_for(class) > 0 {
				debug!(worker = %self.worker_id, class = %class, "Waiting for pending transaction");
				return Ok(BroadcastOutcome::Blocked(class));
			}
			if !head.is_eligible_at(now_millis()) {
				backoff.get_or_insert(class);
				continue;
			}
			if !self.leases.acquire_slot(class).await? {
				debug!(worker = %self.worker_id, class = %class, "Broadcast slot held elsewhere");
				return Ok(BroadcastOutcome::Blocked(class));
			}

			let outcome = self.broadcast_class(class).await;
			let released = self.leases.release_slot(class).await;
			let outcome = outcome?;
			released?;
			return Ok(outcome);
		}

		Ok(backoff.map_or(BroadcastOutcome::Idle, BroadcastOutcome::Backoff))
	}

	async fn broadcast_class(&self, class: TxClass) -> Result<BroadcastOutcome, CoreError> {
		// Another worker may have recorded a pending transaction between the
		// statistics read and the slot acquisition.
		if self.active.has_pending(class).await? {
			return Ok(BroadcastOutcome::Blocked(class));
		}

		let Some(claimed) = self.queue.claim(class).await? else {
			return Ok(BroadcastOutcome::Idle);
		};
		if !claimed.value.is_eligible_at(now_millis()) {
			self.queue.requeue_front(&claimed, &claimed.value).await?;
			return Ok(BroadcastOutcome::Backoff(class));
		}

		self.process(&claimed).await
	}

	async fn process(&self, claimed: &Claimed) -> Result<BroadcastOutcome, CoreError> {
		let request = &claimed.value;
		let class = request.class();

		if let Some(previous) = request.last_attempt_hash {
			match self.ctx.ledger.transaction(previous).await {
				Ok(Some(found)) => {
					let sender = self.sender(class).await?;
					info!(
						tx_hash = %short_hash(&previous),
						class = %class,
						"Previous attempt reached the ledger, adopting it"
					);
					self.finalize(&self.queue, claimed, previous, sender, found.nonce, Vec::new())
						.await?;
					return Ok(BroadcastOutcome::Adopted(previous));
				}
				Ok(None) => {}
				Err(e) => return self.handle_failure(claimed, None, e.into()).await,
			}
		}

		match &request.payload {
			TxPayload::Transfer(transfer) => {
				let pool_address = self.ctx.payment_account.get_address().await?;
				if transfer.address_to == pool_address {
					self.queue
						.flag_failed(claimed, request, "transfer to the pool's own payment address")
						.await?;
					return Ok(BroadcastOutcome::Flagged(class));
				}
				if self
					.records
					.is_payout_confirmed(&transfer.payment_id)
					.await?
				{
					info!(
						payment_id = %transfer.payment_id,
						"Payout already confirmed, skipping transfer"
					);
					self.queue.release(claimed).await?;
					return Ok(BroadcastOutcome::DuplicatePayout(transfer.payment_id.clone()));
				}
			}
			TxPayload::Solution(solution) => {
				let current = params::current_challenge(&self.ctx.storage).await?;
				if current != Some(solution.challenge_number) {
					warn!(
						solution_challenge = %solution.challenge_number,
						current_challenge = ?current,
						"Stale challenge number, submitting anyway"
					);
				}
			}
		}

		let prepared = match self.submitter.prepare(&request.payload).await {
			Ok(prepared) => prepared,
			Err(e) => return self.handle_failure(claimed, None, e).await,
		};

		// Preparing may have taken a while; stay visibly alive through the send.
		self.leases.heartbeat().await?;
		let attempt = BroadcastAttempt {
			request_id: request.id,
			tx_hash: prepared.signed.hash,
			sender: prepared.sender,
			nonce: prepared.nonce,
			worker_id: self.worker_id.clone(),
			attempted_at: now_millis(),
		};
		self.ctx
			.storage
			.hash_set(keys::BROADCAST_ATTEMPTS, &request.id.to_string(), &attempt)
			.await?;

		match self.submitter.send(&prepared).await {
			Ok(hash) => {
				self.finalize(
					&self.queue,
					claimed,
					hash,
					prepared.sender,
					prepared.nonce,
					prepared.merge_mint_addresses,
				)
				.await?;
				Ok(BroadcastOutcome::Broadcast(hash))
			}
			Err(e) => {
				self.handle_failure(claimed, Some(prepared.signed.hash), e)
					.await
			}
		}
	}

	/// Records an accepted transaction as pending, writes its audit record
	/// and drops the in-flight copy from `queue`.
	async fn finalize(
		&self,
		queue: &TransactionQueue,
		claimed: &Claimed,
		tx_hash: B256,
		sender: Address,
		nonce: u64,
		merge_mint_addresses: Vec<Address>,
	) -> Result<(), StorageError> {
		let request = &claimed.value;
		let block = params::current_block(&self.ctx.storage).await?;

		let tx = BroadcastTransaction {
			tx_hash,
			request_id: request.id,
			payload: request.payload.clone(),
			sender,
			nonce,
			broadcast_block: block,
			status: TxStatus::Pending,
		};
		self.active.record(&tx).await?;

		match &request.payload {
			TxPayload::Transfer(transfer) => {
				self.records
					.record_payout(&PayoutRecord {
						address_to: transfer.address_to,
						payment_id: transfer.payment_id.clone(),
						token_amount: transfer.token_amount,
						tx_hash: Some(tx_hash),
						block,
						confirmed: false,
					})
					.await?
			}
			TxPayload::Solution(solution) => {
				self.records
					.record_solution(&SubmittedSolution {
						tx_hash,
						miner_address: solution.miner_address,
						challenge_number: solution.challenge_number,
						token_reward: solution.token_reward,
						merge_mint_addresses,
						block,
					})
					.await?
			}
		}

		queue.release(claimed).await?;
		self.ctx
			.storage
			.hash_delete(keys::BROADCAST_ATTEMPTS, &request.id.to_string())
			.await?;

		info!(
			tx_hash = %short_hash(&tx_hash),
			class = %request.class(),
			worker = %self.worker_id,
			block,
			"Broadcast transaction"
		);
		Ok(())
	}

	/// Requeues at the head of the class with backoff, or flags the request
	/// once its attempt budget is spent.
	async fn handle_failure(
		&self,
		claimed: &Claimed,
		attempt_hash: Option<B256>,
		error: BroadcastError,
	) -> Result<BroadcastOutcome, CoreError> {
		// Left in flight; the next tick's recovery resolves it.
		if let BroadcastError::Storage(e) = error {
			return Err(e.into());
		}

		let class = claimed.value.class();
		let mut updated = claimed.value.clone();
		if attempt_hash.is_some() {
			updated.last_attempt_hash = attempt_hash;
		}

		let outcome = if !error.consumes_attempt() {
			warn!(
				request_id = %updated.id,
				class = %class,
				error = %error,
				"Ledger unavailable, retrying next tick"
			);
			self.queue.requeue_front(claimed, &updated).await?;
			BroadcastOutcome::Requeued(class)
		} else {
			updated.attempts += 1;
			if updated.attempts >= self.ctx.settings.coordinator.max_broadcast_attempts {
				self.queue
					.flag_failed(claimed, &updated, &error.to_string())
					.await?;
				BroadcastOutcome::Flagged(class)
			} else {
				let delay = self.retry_delay(updated.attempts);
				updated.retry_after = Some(now_millis() + delay.as_millis() as u64);
				warn!(
					request_id = %updated.id,
					class = %class,
					attempts = updated.attempts,
					retry_in_ms = delay.as_millis() as u64,
					error = %error,
					"Broadcast failed, requeueing"
				);
				self.queue.requeue_front(claimed, &updated).await?;
				BroadcastOutcome::Requeued(class)
			}
		};

		self.ctx
			.storage
			.hash_delete(keys::BROADCAST_ATTEMPTS, &updated.id.to_string())
			.await?;
		Ok(outcome)
	}

	/// Exponential delay before retry number `attempts`.
	fn retry_delay(&self, attempts: u32) -> Duration {
		let config = &self.ctx.settings.coordinator;
		let mut policy = ExponentialBackoffBuilder::new()
			.with_initial_interval(Duration::from_millis(config.retry_backoff_ms))
			.with_multiplier(2.0)
			.with_randomization_factor(0.0)
			.with_max_interval(Duration::from_millis(config.retry_backoff_max_ms))
			.with_max_elapsed_time(None)
			.build();

		let mut delay = Duration::from_millis(config.retry_backoff_ms);
		for _ in 0..attempts {
			match policy.next_backoff() {
				Some(next) => delay = next,
				None => break,
			}
		}
		delay
	}

	/// Resolves requests left in flight by this worker, which only happens
	/// after a crash or a storage failure mid-broadcast, and by any worker
	/// whose heartbeat has expired.
	async fn recover_orphans(&self) -> Result<(), CoreError> {
		self.leases.heartbeat().await?;
		self.recover_in_flight(&self.queue).await?;
		for class in TxClass::ALL {
			self.leases.release_slot(class).await?;
		}

		for (peer, lease) in self.leases.expired_peers().await? {
			if !self.leases.take_over(&peer, &lease).await? {
				continue;
			}
			warn!(
				worker = %self.worker_id,
				peer = %peer,
				last_heartbeat = lease.value.heartbeat_at,
				"Recovering requests of an expired worker"
			);
			let queue = TransactionQueue::new(self.ctx.storage.clone(), &peer);
			self.recover_in_flight(&queue).await?;
			self.leases.retire(&peer).await?;
		}
		Ok(())
	}

	async fn recover_in_flight(&self, queue: &TransactionQueue) -> Result<(), CoreError> {
		for claimed in queue.in_flight().await? {
			let request_id = claimed.value.id.to_string();
			let attempt = self
				.ctx
				.storage
				.hash_get::<BroadcastAttempt>(keys::BROADCAST_ATTEMPTS, &request_id)
				.await?
				.map(|entry| entry.value);

			match attempt {
				Some(attempt) => {
					// Propagating keeps the tick from broadcasting while an
					// earlier attempt of the class may still be in the mempool.
					if self.ctx.ledger.transaction(attempt.tx_hash).await?.is_some() {
						info!(
							tx_hash = %short_hash(&attempt.tx_hash),
							request_id = %request_id,
							"Adopting orphaned broadcast"
						);
						self.finalize(
							queue,
							&claimed,
							attempt.tx_hash,
							attempt.sender,
							attempt.nonce,
							Vec::new(),
						)
						.await?;
					} else {
						warn!(request_id = %request_id, "Requeueing orphaned attempt");
						let mut updated = claimed.value.clone();
						updated.last_attempt_hash = Some(attempt.tx_hash);
						queue.requeue_front(&claimed, &updated).await?;
						self.ctx
							.storage
							.hash_delete(keys::BROADCAST_ATTEMPTS, &request_id)
							.await?;
					}
				}
				None => {
					warn!(request_id = %request_id, "Requeueing orphaned request");
					queue.requeue_front(&claimed, &claimed.value).await?;
				}
			}
		}
		Ok(())
	}

	async fn sender(&self, class: TxClass) -> Result<Address, CoreError> {
		let account = match class {
			TxClass::Solution => &self.ctx.minting_account,
			TxClass::Transfer => &self.ctx.payment_account,
		};
		Ok(account.get_address().await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{challenge, context_with, settings, MockLedger, PAYMENT_ADDRESS};
	use pool_types::{SlotLease, SolutionPayload, TransferPayload, WorkerLease, U256};

	const WORKER: &str = "w-0";

	fn slot(owner: &str, acquired_at: u64) -> SlotLease {
		SlotLease {
			owner: owner.to_string(),
			acquired_at,
		}
	}

	fn solution(n: u64, challenge_number: B256) -> QueuedTransactionRequest {
		QueuedTransactionRequest::new(
			TxPayload::Solution(SolutionPayload {
				miner_address: Address::repeat_byte(1),
				solution_number: U256::from(n),
				challenge_digest: B256::repeat_byte(2),
				challenge_number,
				token_reward: U256::from(50u64),
			}),
			100,
		)
	}

	fn transfer(to: Address, payment_id: &str) -> QueuedTransactionRequest {
		QueuedTransactionRequest::new(
			TxPayload::Transfer(TransferPayload {
				address_to: to,
				token_amount: U256::from(1000u64),
				payment_id: payment_id.to_string(),
			}),
			100,
		)
	}

	fn miner() -> Address {
		Address::repeat_byte(0x44)
	}

	async fn setup(
		ledger: Arc<MockLedger>,
		settings: crate::CoordinatorSettings,
	) -> (Arc<CoordinatorContext>, TransactionQueue, ActiveTransactions) {
		let ctx = context_with(ledger, settings);
		ctx.storage
			.set(keys::ETH_BLOCK_NUMBER, "100")
			.await
			.unwrap();
		ctx.storage
			.set(keys::CHALLENGE_NUMBER, &challenge(3).to_string())
			.await
			.unwrap();
		let queue = TransactionQueue::new(ctx.storage.clone(), WORKER);
		let active = ActiveTransactions::new(ctx.storage.clone());
		(ctx, queue, active)
	}

	fn fast_retry() -> crate::CoordinatorSettings {
		let mut settings = settings();
		settings.coordinator.retry_backoff_ms = 0;
		settings.coordinator.retry_backoff_max_ms = 0;
		settings
	}

	#[tokio::test]
	async fn test_broadcasts_head_as_pending() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		let request = solution(1, challenge(3));
		queue.enqueue(&request).await.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		let BroadcastOutcome::Broadcast(hash) = scheduler.tick().await.unwrap() else {
			panic!("expected a broadcast");
		};

		let record = active.get(&hash).await.unwrap().unwrap().value;
		assert_eq!(record.status, TxStatus::Pending);
		assert_eq!(record.request_id, request.id);
		assert_eq!(record.broadcast_block, 100);
		assert!(queue.in_flight().await.unwrap().is_empty());
		assert!(ctx
			.storage
			.hash_get::<BroadcastAttempt>(keys::BROADCAST_ATTEMPTS, &request.id.to_string())
			.await
			.unwrap()
			.is_none());
		assert!(ctx
			.storage
			.backend()
			.hash_get(keys::BROADCAST_SLOTS, "solution")
			.await
			.unwrap()
			.is_none());

		let solutions = SubmissionRecords::new(ctx.storage.clone())
			.solutions()
			.await
			.unwrap();
		assert_eq!(solutions.len(), 1);
		assert_eq!(solutions[0].tx_hash, hash);
	}

	#[tokio::test]
	async fn test_one_pending_per_class() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue.enqueue(&solution(1, challenge(3))).await.unwrap();
		queue.enqueue(&solution(2, challenge(3))).await.unwrap();
		queue
			.enqueue(&transfer(miner(), "pay-1"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		assert!(matches!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Broadcast(_)
		));
		// The solution head waits, and with it the transfer behind it.
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Blocked(TxClass::Solution)
		);
		assert_eq!(ledger.with(|s| s.sent.len()), 1);
	}

	#[tokio::test]
	async fn test_transfer_proceeds_while_solution_pending() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		queue.enqueue(&solution(1, challenge(3))).await.unwrap();
		queue
			.enqueue(&transfer(miner(), "pay-1"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		scheduler.tick().await.unwrap();
		let BroadcastOutcome::Broadcast(hash) = scheduler.tick().await.unwrap() else {
			panic!("expected the transfer to broadcast");
		};
		assert_eq!(
			active.get(&hash).await.unwrap().unwrap().value.class(),
			TxClass::Transfer
		);

		let payout = SubmissionRecords::new(ctx.storage.clone())
			.payout("pay-1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(payout.tx_hash, Some(hash));
		assert!(!payout.confirmed);
	}

	#[tokio::test]
	async fn test_duplicate_payout_skipped_without_nonce_draw() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		let records = SubmissionRecords::new(ctx.storage.clone());
		records
			.record_payout(&PayoutRecord {
				address_to: miner(),
				payment_id: "pay-7".into(),
				token_amount: U256::from(1000u64),
				tx_hash: Some(B256::repeat_byte(0x77)),
				block: 90,
				confirmed: true,
			})
			.await
			.unwrap();
		queue
			.enqueue(&transfer(miner(), "pay-7"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::DuplicatePayout("pay-7".into())
		);
		assert_eq!(ledger.with(|s| s.nonce_draws), 0);
		assert!(queue.peek_eligible_head().await.unwrap().is_none());
		assert!(queue.in_flight().await.unwrap().is_empty());
		assert!(queue.failed().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_self_transfer_is_flagged() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue
			.enqueue(&transfer(PAYMENT_ADDRESS, "pay-self"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Flagged(TxClass::Transfer)
		);
		assert_eq!(ledger.with(|s| s.nonce_draws), 0);
		assert_eq!(queue.failed().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_stale_challenge_is_still_submitted() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue.enqueue(&solution(1, challenge(9))).await.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		assert!(matches!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Broadcast(_)
		));
	}

	#[tokio::test]
	async fn test_rejections_requeue_then_flag() {
		let ledger = Arc::new(MockLedger::new());
		ledger.with(|s| s.reject_sends = true);
		let (ctx, queue, active) = setup(ledger.clone(), fast_retry()).await;
		let request = transfer(miner(), "pay-1");
		queue.enqueue(&request).await.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		for attempt in 1..3 {
			assert_eq!(
				scheduler.tick().await.unwrap(),
				BroadcastOutcome::Requeued(TxClass::Transfer)
			);
			let head = queue.peek(TxClass::Transfer).await.unwrap().unwrap();
			assert_eq!(head.id, request.id);
			assert_eq!(head.attempts, attempt);
			assert!(head.retry_after.is_some());
			assert!(head.last_attempt_hash.is_some());
		}

		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Flagged(TxClass::Transfer)
		);
		let failed = queue.failed().await.unwrap();
		assert_eq!(failed[0].request.id, request.id);
		assert_eq!(failed[0].request.attempts, 3);
		assert!(active.all().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_backoff_delays_retry() {
		let ledger = Arc::new(MockLedger::new());
		ledger.with(|s| s.reject_sends = true);
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue
			.enqueue(&transfer(miner(), "pay-1"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		scheduler.tick().await.unwrap();
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Backoff(TxClass::Transfer)
		);
		assert_eq!(scheduler.retry_delay(1), Duration::from_millis(2000));
		assert_eq!(scheduler.retry_delay(2), Duration::from_millis(4000));
		assert_eq!(scheduler.retry_delay(10), Duration::from_millis(60_000));
	}

	#[tokio::test]
	async fn test_outage_does_not_consume_attempts() {
		let ledger = Arc::new(MockLedger::new());
		ledger.with(|s| s.unavailable = true);
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue
			.enqueue(&transfer(miner(), "pay-1"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Requeued(TxClass::Transfer)
		);
		let head = queue.peek(TxClass::Transfer).await.unwrap().unwrap();
		assert_eq!(head.attempts, 0);
		assert!(head.retry_after.is_none());
	}

	#[tokio::test]
	async fn test_known_previous_attempt_is_adopted() {
		let ledger = Arc::new(MockLedger::new());
		let previous = B256::repeat_byte(0x99);
		ledger.with(|s| {
			s.known.insert(previous);
		});
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		let mut request = transfer(miner(), "pay-1");
		request.attempts = 1;
		request.last_attempt_hash = Some(previous);
		queue.enqueue(&request).await.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Adopted(previous)
		);
		assert_eq!(ledger.with(|s| s.sent.len()), 0);
		assert_eq!(
			active.get(&previous).await.unwrap().unwrap().value.status,
			TxStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_orphan_with_known_attempt_is_adopted() {
		let ledger = Arc::new(MockLedger::new());
		let hash = B256::repeat_byte(0x55);
		ledger.with(|s| {
			s.known.insert(hash);
		});
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		let request = solution(1, challenge(3));
		queue.enqueue(&request).await.unwrap();

		// Simulate a crash between send and record.
		queue.claim(TxClass::Solution).await.unwrap().unwrap();
		ctx.storage
			.hash_set(
				keys::BROADCAST_ATTEMPTS,
				&request.id.to_string(),
				&BroadcastAttempt {
					request_id: request.id,
					tx_hash: hash,
					sender: Address::repeat_byte(0xa1),
					nonce: 4,
					worker_id: WORKER.into(),
					attempted_at: 0,
				},
			)
			.await
			.unwrap();
		ctx.storage
			.hash_set(keys::BROADCAST_SLOTS, "solution", &slot(WORKER, now_millis()))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Idle
		);

		let record = active.get(&hash).await.unwrap().unwrap().value;
		assert_eq!(record.status, TxStatus::Pending);
		assert_eq!(record.nonce, 4);
		assert!(queue.in_flight().await.unwrap().is_empty());
		assert_eq!(ledger.with(|s| s.sent.len()), 0);
		assert!(ctx
			.storage
			.backend()
			.hash_get(keys::BROADCAST_SLOTS, "solution")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_orphan_without_attempt_is_broadcast_once() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		let request = solution(1, challenge(3));
		queue.enqueue(&request).await.unwrap();
		queue.claim(TxClass::Solution).await.unwrap().unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		assert!(matches!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Broadcast(_)
		));
		assert_eq!(active.all().await.unwrap().len(), 1);
		assert_eq!(ledger.with(|s| s.sent.len()), 1);
	}

	#[tokio::test]
	async fn test_orphan_with_unknown_attempt_keeps_hash() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		let request = transfer(miner(), "pay-1");
		queue.enqueue(&request).await.unwrap();
		queue.claim(TxClass::Transfer).await.unwrap().unwrap();
		let lost_attempt = B256::repeat_byte(0x66);
		ctx.storage
			.hash_set(
				keys::BROADCAST_ATTEMPTS,
				&request.id.to_string(),
				&BroadcastAttempt {
					request_id: request.id,
					tx_hash: lost_attempt,
					sender: PAYMENT_ADDRESS,
					nonce: 0,
					worker_id: WORKER.into(),
					attempted_at: 0,
				},
			)
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		scheduler.recover_orphans().await.unwrap();

		let head = queue.peek(TxClass::Transfer).await.unwrap().unwrap();
		assert_eq!(head.id, request.id);
		assert_eq!(head.last_attempt_hash, Some(lost_attempt));
		assert!(queue.in_flight().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_slot_held_by_other_worker_blocks() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, _) = setup(ledger.clone(), settings()).await;
		queue.enqueue(&solution(1, challenge(3))).await.unwrap();
		ctx.storage
			.hash_set(keys::BROADCAST_SLOTS, "solution", &slot("other-7", now_millis()))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Blocked(TxClass::Solution)
		);
		assert_eq!(
			ctx.storage
				.hash_get::<SlotLease>(keys::BROADCAST_SLOTS, "solution")
				.await
				.unwrap()
				.unwrap()
				.value
				.owner,
			"other-7"
		);
		assert_eq!(ledger.with(|s| s.sent.len()), 0);
	}

	#[tokio::test]
	async fn test_concurrent_workers_never_double_pending() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		for n in 0..3 {
			queue.enqueue(&solution(n, challenge(3))).await.unwrap();
			queue
				.enqueue(&transfer(miner(), &format!("pay-{}", n)))
				.await
				.unwrap();
		}

		let mut handles = Vec::new();
		for worker in 0..4 {
			let scheduler = BroadcastScheduler::new(ctx.clone(), &format!("w-{}", worker));
			handles.push(tokio::spawn(async move {
				for _ in 0..5 {
					scheduler.tick().await.unwrap();
				}
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let pending: Vec<_> = active
			.all()
			.await
			.unwrap()
			.into_iter()
			.filter(|tx| tx.status == TxStatus::Pending)
			.collect();
		for class in TxClass::ALL {
			assert!(pending.iter().filter(|tx| tx.class() == class).count() <= 1);
		}
		assert_eq!(pending.len(), ledger.with(|s| s.sent.len()));
	}

	#[tokio::test]
	async fn test_solution_in_backoff_lets_transfers_through() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, queue, active) = setup(ledger.clone(), settings()).await;
		let mut waiting = solution(1, challenge(3));
		waiting.attempts = 1;
		waiting.retry_after = Some(now_millis() + 60_000);
		queue.enqueue(&waiting).await.unwrap();
		queue
			.enqueue(&transfer(miner(), "pay-1"))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx, WORKER);
		let BroadcastOutcome::Broadcast(hash) = scheduler.tick().await.unwrap() else {
			panic!("expected the transfer to broadcast");
		};
		assert_eq!(
			active.get(&hash).await.unwrap().unwrap().value.class(),
			TxClass::Transfer
		);
		assert_eq!(
			scheduler.tick().await.unwrap(),
			BroadcastOutcome::Backoff(TxClass::Solution)
		);
		assert_eq!(
			queue.peek(TxClass::Solution).await.unwrap().unwrap().id,
			waiting.id
		);
	}

	#[tokio::test]
	async fn test_live_worker_with_same_index_is_left_alone() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, _, _) = setup(ledger.clone(), settings()).await;
		let timeout = ctx.settings.coordinator.lease_timeout_ms;

		// Worker 0 of process A is mid-broadcast.
		let queue_a = TransactionQueue::new(ctx.storage.clone(), "pool-a-0");
		let leases_a = WorkerLeases::new(ctx.storage.clone(), "pool-a-0", timeout);
		queue_a.enqueue(&solution(1, challenge(3))).await.unwrap();
		queue_a.enqueue(&solution(2, challenge(3))).await.unwrap();
		leases_a.heartbeat().await.unwrap();
		assert!(leases_a.acquire_slot(TxClass::Solution).await.unwrap());
		let claimed_a = queue_a.claim(TxClass::Solution).await.unwrap().unwrap();

		// Worker 0 of process B must not treat that claim as an orphan.
		let scheduler_b = BroadcastScheduler::new(ctx.clone(), "pool-b-0");
		assert_eq!(
			scheduler_b.tick().await.unwrap(),
			BroadcastOutcome::Blocked(TxClass::Solution)
		);
		assert_eq!(queue_a.in_flight().await.unwrap(), vec![claimed_a.clone()]);
		assert_eq!(
			ctx.storage
				.hash_get::<SlotLease>(keys::BROADCAST_SLOTS, "solution")
				.await
				.unwrap()
				.unwrap()
				.value
				.owner,
			"pool-a-0"
		);
		assert_eq!(ledger.with(|s| s.sent.len()), 0);

		// A resumes, finishes its request, and B then waits on the pending
		// transaction instead of sending the same request again.
		let scheduler_a = BroadcastScheduler::new(ctx.clone(), "pool-a-0");
		assert!(matches!(
			scheduler_a.tick().await.unwrap(),
			BroadcastOutcome::Broadcast(_)
		));
		assert_eq!(
			scheduler_b.tick().await.unwrap(),
			BroadcastOutcome::Blocked(TxClass::Solution)
		);
		assert_eq!(ledger.with(|s| s.sent.len()), 1);
		assert!(queue_a.in_flight().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_expired_worker_requests_are_recovered() {
		let ledger = Arc::new(MockLedger::new());
		let (ctx, _, active) = setup(ledger.clone(), settings()).await;
		let request = transfer(miner(), "pay-1");
		let stale = now_millis() - 2 * ctx.settings.coordinator.lease_timeout_ms;

		// A process that crashed mid-broadcast and never came back.
		let gone = TransactionQueue::new(ctx.storage.clone(), "gone-3");
		gone.enqueue(&request).await.unwrap();
		gone.claim(TxClass::Transfer).await.unwrap().unwrap();
		ctx.storage
			.hash_set(
				keys::WORKER_LEASES,
				"gone-3",
				&WorkerLease { heartbeat_at: stale },
			)
			.await
			.unwrap();
		ctx.storage
			.hash_set(keys::BROADCAST_SLOTS, "transfer", &slot("gone-3", stale))
			.await
			.unwrap();

		let scheduler = BroadcastScheduler::new(ctx.clone(), WORKER);
		let BroadcastOutcome::Broadcast(hash) = scheduler.tick().await.unwrap() else {
			panic!("expected the recovered transfer to broadcast");
		};
		assert_eq!(
			active.get(&hash).await.unwrap().unwrap().value.request_id,
			request.id
		);
		assert!(gone.in_flight().await.unwrap().is_empty());
		assert!(ctx
			.storage
			.backend()
			.hash_get(keys::WORKER_LEASES, "gone-3")
			.await
			.unwrap()
			.is_none());
		assert_eq!(ledger.with(|s| s.sent.len()), 1);
	}
}
