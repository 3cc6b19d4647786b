//! Worker heartbeats and per-class broadcast slots.
//!
//! Worker ids are unique across every process sharing the store. A worker
//! refreshes its heartbeat on each broadcast tick; once the heartbeat is
//! older than the lease timeout the worker is presumed dead and any other
//! worker may take over its in-flight requests. Broadcast slots carry the
//! time they were taken and may be taken over after the same timeout.

use crate::keys;
use pool_storage::{Entry, StorageError, StorageService};
use pool_types::{now_millis, SlotLease, TxClass, WorkerLease};
use std::sync::Arc;
use tracing::warn;

pub struct WorkerLeases {
	storage: Arc<StorageService>,
	worker_id: String,
	timeout_ms: u64,
}

impl WorkerLeases {
	pub fn new(storage: Arc<StorageService>, worker_id: &str, timeout_ms: u64) -> Self {
		Self {
			storage,
			worker_id: worker_id.to_string(),
			timeout_ms,
		}
	}

	fn is_expired(&self, since: u64, now: u64) -> bool {
		now.saturating_sub(since) > self.timeout_ms
	}

	/// Marks this worker alive.
	pub async fn heartbeat(&self) -> Result<(), StorageError> {
		self.storage
			.hash_set(
				keys::WORKER_LEASES,
				&self.worker_id,
				&WorkerLease {
					heartbeat_at: now_millis(),
				},
			)
			.await
	}

	/// Other workers whose heartbeat has expired.
	pub async fn expired_peers(&self) -> Result<Vec<(String, Entry<WorkerLease>)>, StorageError> {
		let now = now_millis();
		let mut expired = Vec::new();
		for (worker_id, raw) in self.storage.backend().hash_entries(keys::WORKER_LEASES).await? {
			if worker_id == self.worker_id {
				continue;
			}
			match serde_json::from_str::<WorkerLease>(&raw) {
				Ok(lease) if self.is_expired(lease.heartbeat_at, now) => {
					expired.push((worker_id, Entry { value: lease, raw }));
				}
				Ok(_) => {}
				Err(e) => {
					warn!(worker = %worker_id, error = %e, "Dropping malformed worker lease");
					self.storage
						.hash_compare_and_delete(keys::WORKER_LEASES, &worker_id, &raw)
						.await?;
				}
			}
		}
		Ok(expired)
	}

	/// Claims recovery of an expired peer. The peer's lease is refreshed in
	/// our name so no other worker recovers it at the same time; it is
	/// removed by [`retire`](Self::retire) once recovery completes.
	pub async fn take_over(
		&self,
		peer: &str,
		lease: &Entry<WorkerLease>,
	) -> Result<bool, StorageError> {
		self.storage
			.hash_compare_and_set(
				keys::WORKER_LEASES,
				peer,
				&lease.raw,
				&WorkerLease {
					heartbeat_at: now_millis(),
				},
			)
			.await
	}

	pub async fn retire(&self, peer: &str) -> Result<(), StorageError> {
		self.storage.hash_delete(keys::WORKER_LEASES, peer).await
	}

	/// Takes the broadcast slot of `class`, either because it is free or
	/// because its holder kept it past the lease timeout.
	pub async fn acquire_slot(&self, class: TxClass) -> Result<bool, StorageError> {
		let now = now_millis();
		let lease = SlotLease {
			owner: self.worker_id.clone(),
			acquired_at: now,
		};
		if self
			.storage
			.hash_set_if_absent(keys::BROADCAST_SLOTS, class.as_str(), &lease)
			.await?
		{
			return Ok(true);
		}

		let Some(raw) = self
			.storage
			.backend()
			.hash_get(keys::BROADCAST_SLOTS, class.as_str())
			.await?
		else {
			return Ok(false);
		};
		match serde_json::from_str::<SlotLease>(&raw) {
			Ok(held) if !self.is_expired(held.acquired_at, now) => return Ok(false),
			Ok(held) => warn!(
				class = %class,
				owner = %held.owner,
				"Taking over expired broadcast slot"
			),
			Err(e) => warn!(class = %class, error = %e, "Replacing malformed broadcast slot"),
		}
		self.storage
			.hash_compare_and_set(keys::BROADCAST_SLOTS, class.as_str(), &raw, &lease)
			.await
	}

	/// Clears the slot of `class` if this worker holds it.
	pub async fn release_slot(&self, class: TxClass) -> Result<(), StorageError> {
		let Some(raw) = self
			.storage
			.backend()
			.hash_get(keys::BROADCAST_SLOTS, class.as_str())
			.await?
		else {
			return Ok(());
		};
		let owned = serde_json::from_str::<SlotLease>(&raw)
			.is_ok_and(|held| held.owner == self.worker_id);
		if owned {
			self.storage
				.hash_compare_and_delete(keys::BROADCAST_SLOTS, class.as_str(), &raw)
				.await?;
		}
		Ok(())
	}
}
