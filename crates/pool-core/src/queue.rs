//! Durable per-class FIFO of requests waiting to be broadcast.
//!
//! Claiming a request moves it atomically from its class list into the
//! claiming worker's in-flight list. It stays there until the request is
//! recorded as pending, requeued or flagged, so a crash at any point leaves
//! it recoverable.

use crate::keys;
use pool_storage::{Entry, StorageError, StorageService};
use pool_types::{now_millis, FlaggedRequest, QueuedTransactionRequest, TxClass};
use std::sync::Arc;
use tracing::{error, warn};

pub struct TransactionQueue {
	storage: Arc<StorageService>,
	/// Key of this worker's in-flight list.
	inflight: String,
}

impl TransactionQueue {
	/// Creates a queue handle for `worker_id`. Only claiming and recovery
	/// depend on the worker id; producers may use any.
	pub fn new(storage: Arc<StorageService>, worker_id: &str) -> Self {
		Self {
			storage,
			inflight: keys::inflight(worker_id),
		}
	}

	/// Appends to the back of the request's class list.
	pub async fn enqueue(&self, request: &QueuedTransactionRequest) -> Result<(), StorageError> {
		self.storage
			.push_back(keys::queue(request.class()), request)
			.await
	}

	/// The request the next [`dequeue`](Self::dequeue) would return:
	/// the solution head if any, else the transfer head.
	pub async fn peek_eligible_head(
		&self,
	) -> Result<Option<QueuedTransactionRequest>, StorageError> {
		for class in TxClass::ALL {
			if let Some(request) = self.peek(class).await? {
				return Ok(Some(request));
			}
		}
		Ok(None)
	}

	/// Head of one class list. Undecodable heads are quarantined.
	pub async fn peek(&self, class: TxClass) -> Result<Option<QueuedTransactionRequest>, StorageError> {
		let backend = self.storage.backend();
		let list = keys::queue(class);
		while let Some(raw) = backend.list_peek_front(list).await? {
			match serde_json::from_str(&raw) {
				Ok(request) => return Ok(Some(request)),
				Err(e) => {
					warn!(class = %class, error = %e, "Quarantining malformed queue entry");
					backend.list_remove(list, &raw).await?;
					backend
						.list_push_back(keys::MALFORMED_TRANSACTIONS, &raw)
						.await?;
				}
			}
		}
		Ok(None)
	}

	/// Removes the eligible head, solution class first.
	pub async fn dequeue(&self) -> Result<Option<Entry<QueuedTransactionRequest>>, StorageError> {
		for class in TxClass::ALL {
			if let Some(entry) = self.claim(class).await? {
				return Ok(Some(entry));
			}
		}
		Ok(None)
	}

	/// Atomically moves the head of `class` into this worker's in-flight
	/// list and returns it.
	pub async fn claim(
		&self,
		class: TxClass,
	) -> Result<Option<Entry<QueuedTransactionRequest>>, StorageError> {
		let backend = self.storage.backend();
		while let Some(raw) = backend
			.list_move_front(keys::queue(class), &self.inflight)
			.await?
		{
			match serde_json::from_str(&raw) {
				Ok(value) => return Ok(Some(Entry { value, raw })),
				Err(e) => {
					warn!(class = %class, error = %e, "Quarantining malformed queue entry");
					self.quarantine(&raw).await?;
				}
			}
		}
		Ok(None)
	}

	/// Puts `updated` back at the head of its class and drops the claimed
	/// copy.
	pub async fn requeue_front(
		&self,
		claimed: &Entry<QueuedTransactionRequest>,
		updated: &QueuedTransactionRequest,
	) -> Result<(), StorageError> {
		// Push before removing: a crash in between duplicates, never loses.
		self.storage
			.push_front(keys::queue(updated.class()), updated)
			.await?;
		self.storage.remove(&self.inflight, &claimed.raw).await?;
		Ok(())
	}

	/// Drops the claimed copy after the request reached a final decision.
	pub async fn release(
		&self,
		claimed: &Entry<QueuedTransactionRequest>,
	) -> Result<(), StorageError> {
		self.storage.remove(&self.inflight, &claimed.raw).await?;
		Ok(())
	}

	/// Moves a request out of circulation for manual recovery.
	pub async fn flag_failed(
		&self,
		claimed: &Entry<QueuedTransactionRequest>,
		request: &QueuedTransactionRequest,
		reason: &str,
	) -> Result<(), StorageError> {
		error!(
			request_id = %request.id,
			class = %request.class(),
			attempts = request.attempts,
			reason,
			"Flagging transaction request as failed"
		);
		let flagged = FlaggedRequest {
			request: request.clone(),
			reason: reason.to_string(),
			flagged_at: now_millis(),
		};
		self.storage
			.push_back(keys::FAILED_TRANSACTIONS, &flagged)
			.await?;
		self.storage.remove(&self.inflight, &claimed.raw).await?;
		Ok(())
	}

	/// Requests this worker claimed but has not finished with.
	pub async fn in_flight(&self) -> Result<Vec<Entry<QueuedTransactionRequest>>, StorageError> {
		let mut entries = Vec::new();
		for raw in self.storage.backend().list_range(&self.inflight).await? {
			match serde_json::from_str(&raw) {
				Ok(value) => entries.push(Entry { value, raw }),
				Err(e) => {
					warn!(error = %e, "Quarantining malformed in-flight entry");
					self.quarantine(&raw).await?;
				}
			}
		}
		Ok(entries)
	}

	/// Number of requests waiting in either class list.
	pub async fn queued_len(&self) -> Result<usize, StorageError> {
		let mut total = 0;
		for class in TxClass::ALL {
			total += self.storage.len(keys::queue(class)).await?;
		}
		Ok(total)
	}

	pub async fn failed(&self) -> Result<Vec<FlaggedRequest>, StorageError> {
		Ok(self
			.storage
			.range::<FlaggedRequest>(keys::FAILED_TRANSACTIONS)
			.await?
			.into_iter()
			.map(|entry| entry.value)
			.collect())
	}

	async fn quarantine(&self, raw: &str) -> Result<(), StorageError> {
		let backend = self.storage.backend();
		backend
			.list_push_back(keys::MALFORMED_TRANSACTIONS, raw)
			.await?;
		backend.list_remove(&self.inflight, raw).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pool_storage::MemoryStorage;
	use pool_types::{
		Address, SolutionPayload, TransferPayload, TxPayload, B256, U256,
	};

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	fn solution(n: u64) -> QueuedTransactionRequest {
		QueuedTransactionRequest::new(
			TxPayload::Solution(SolutionPayload {
				miner_address: Address::repeat_byte(1),
				solution_number: U256::from(n),
				challenge_digest: B256::repeat_byte(2),
				challenge_number: B256::repeat_byte(3),
				token_reward: U256::from(50u64),
			}),
			10,
		)
	}

	fn transfer(n: u64) -> QueuedTransactionRequest {
		QueuedTransactionRequest::new(
			TxPayload::Transfer(TransferPayload {
				address_to: Address::repeat_byte(4),
				token_amount: U256::from(n),
				payment_id: format!("pay-{}", n),
			}),
			10,
		)
	}

	#[tokio::test]
	async fn test_fifo_with_solution_priority() {
		let queue = TransactionQueue::new(storage(), "w-0");
		let t1 = transfer(1);
		let s1 = solution(1);
		let t2 = transfer(2);
		let s2 = solution(2);
		for request in [&t1, &s1, &t2, &s2] {
			queue.enqueue(request).await.unwrap();
		}

		let mut order = Vec::new();
		loop {
			let head = queue.peek_eligible_head().await.unwrap();
			let Some(entry) = queue.dequeue().await.unwrap() else {
				assert!(head.is_none());
				break;
			};
			assert_eq!(head.as_ref(), Some(&entry.value));
			order.push(entry.value.id);
		}
		assert_eq!(order, vec![s1.id, s2.id, t1.id, t2.id]);
	}

	#[tokio::test]
	async fn test_claim_moves_into_inflight_until_released() {
		let storage = storage();
		let queue = TransactionQueue::new(storage.clone(), "w-3");
		queue.enqueue(&transfer(1)).await.unwrap();

		let entry = queue.claim(TxClass::Transfer).await.unwrap().unwrap();
		assert_eq!(storage.len(keys::TRANSFER_QUEUE).await.unwrap(), 0);
		assert_eq!(queue.in_flight().await.unwrap(), vec![entry.clone()]);

		// Other workers do not see it.
		let other = TransactionQueue::new(storage.clone(), "w-4");
		assert!(other.in_flight().await.unwrap().is_empty());

		queue.release(&entry).await.unwrap();
		assert!(queue.in_flight().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_requeue_goes_to_head_of_class() {
		let queue = TransactionQueue::new(storage(), "w-0");
		let first = transfer(1);
		let second = transfer(2);
		queue.enqueue(&first).await.unwrap();
		queue.enqueue(&second).await.unwrap();

		let entry = queue.claim(TxClass::Transfer).await.unwrap().unwrap();
		let mut updated = entry.value.clone();
		updated.attempts = 1;
		queue.requeue_front(&entry, &updated).await.unwrap();

		let head = queue.peek(TxClass::Transfer).await.unwrap().unwrap();
		assert_eq!(head.id, first.id);
		assert_eq!(head.attempts, 1);
		assert!(queue.in_flight().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_flagged_requests_leave_circulation() {
		let queue = TransactionQueue::new(storage(), "w-0");
		queue.enqueue(&transfer(1)).await.unwrap();
		let entry = queue.claim(TxClass::Transfer).await.unwrap().unwrap();

		queue
			.flag_failed(&entry, &entry.value, "self-transfer")
			.await
			.unwrap();

		let failed = queue.failed().await.unwrap();
		assert_eq!(failed.len(), 1);
		assert_eq!(failed[0].reason, "self-transfer");
		assert!(queue.in_flight().await.unwrap().is_empty());
		assert!(queue.peek_eligible_head().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_malformed_entries_are_quarantined() {
		let storage = storage();
		let queue = TransactionQueue::new(storage.clone(), "w-0");
		storage
			.backend()
			.list_push_back(keys::SOLUTION_QUEUE, "{broken")
			.await
			.unwrap();
		let good = solution(7);
		queue.enqueue(&good).await.unwrap();

		let head = queue.peek_eligible_head().await.unwrap().unwrap();
		assert_eq!(head.id, good.id);
		let entry = queue.claim(TxClass::Solution).await.unwrap().unwrap();
		assert_eq!(entry.value.id, good.id);

		let malformed = storage
			.backend()
			.list_range(keys::MALFORMED_TRANSACTIONS)
			.await
			.unwrap();
		assert_eq!(malformed, vec!["{broken"]);
	}

	#[tokio::test]
	async fn test_concurrent_claims_take_each_request_once() {
		let storage = storage();
		let producer = TransactionQueue::new(storage.clone(), "w-0");
		for n in 0..20 {
			producer.enqueue(&transfer(n)).await.unwrap();
		}

		let mut handles = Vec::new();
		for worker in 0..4 {
			let queue = TransactionQueue::new(storage.clone(), &format!("w-{}", worker));
			handles.push(tokio::spawn(async move {
				let mut ids = Vec::new();
				while let Some(entry) = queue.dequeue().await.unwrap() {
					ids.push(entry.value.id);
				}
				ids
			}));
		}

		let mut all = Vec::new();
		for handle in handles {
			all.extend(handle.await.unwrap());
		}
		let total = all.len();
		all.sort();
		all.dedup();
		assert_eq!(total, 20);
		assert_eq!(all.len(), 20);
	}
}
