//! Durable store for the pool coordinator.
//!
//! Every worker process shares one store and coordinates only through it, so
//! the interface is modelled on the primitives a Redis-like server offers:
//! scalars, lists and hashes addressed by string names, with a small set of
//! atomic operations (move-from-front, set-if-absent, compare-and-set) that
//! the coordinator's correctness depends on.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod redis;
}

pub use implementations::memory::MemoryStorage;
pub use implementations::redis::RedisStorage;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Lists are double-ended; "front" is the oldest element. All operations on a
/// single key are atomic with respect to other callers.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Reads a scalar value.
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

	/// Writes a scalar value, replacing any previous one.
	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

	/// Atomically adds `delta` to an integer scalar, treating a missing key
	/// as zero. Returns the new value.
	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError>;

	/// Deletes a key of any kind.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Appends to the back of a list.
	async fn list_push_back(&self, list: &str, value: &str) -> Result<(), StorageError>;

	/// Prepends to the front of a list.
	async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StorageError>;

	/// Returns the front element without removing it.
	async fn list_peek_front(&self, list: &str) -> Result<Option<String>, StorageError>;

	/// Removes and returns the front element.
	async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StorageError>;

	/// Atomically pops the front of `source` and appends it to the back of
	/// `destination`. No other caller can observe or take the element in
	/// between.
	async fn list_move_front(
		&self,
		source: &str,
		destination: &str,
	) -> Result<Option<String>, StorageError>;

	/// Removes the first element equal to `value`, returning how many were
	/// removed.
	async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StorageError>;

	/// Returns every element, front first.
	async fn list_range(&self, list: &str) -> Result<Vec<String>, StorageError>;

	/// Checks whether `value` is an element of the list.
	async fn list_contains(&self, list: &str, value: &str) -> Result<bool, StorageError>;

	async fn list_len(&self, list: &str) -> Result<usize, StorageError>;

	async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StorageError>;

	async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StorageError>;

	/// Sets `field` only if it is not present. Returns true if it was set.
	async fn hash_set_if_absent(
		&self,
		hash: &str,
		field: &str,
		value: &str,
	) -> Result<bool, StorageError>;

	/// Replaces `field` with `value` only if it currently equals `expected`.
	/// Returns true if the swap happened.
	async fn hash_compare_and_set(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
		value: &str,
	) -> Result<bool, StorageError>;

	/// Deletes `field` only if it currently equals `expected`. Returns true
	/// if it was deleted.
	async fn hash_compare_and_delete(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
	) -> Result<bool, StorageError>;

	async fn hash_delete(&self, hash: &str, field: &str) -> Result<(), StorageError>;

	/// Returns every `(field, value)` pair. Order is unspecified.
	async fn hash_entries(&self, hash: &str) -> Result<Vec<(String, String)>, StorageError>;
}

/// A decoded value together with the exact string it was stored as.
///
/// List removal and compare-and-set match on the stored string, so callers
/// that intend to remove or swap an element keep the raw form around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
	pub value: T,
	pub raw: String,
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic JSON serialization/deserialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Direct access to the untyped backend.
	pub fn backend(&self) -> &dyn StorageInterface {
		self.backend.as_ref()
	}

	pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		self.backend.get(key).await
	}

	pub async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.backend.set(key, value).await
	}

	pub async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
		self.backend.increment(key, delta).await
	}

	/// Reads an integer scalar written by [`increment`](Self::increment).
	/// Missing or unparsable values read as zero.
	pub async fn counter(&self, key: &str) -> Result<i64, StorageError> {
		Ok(self
			.backend
			.get(key)
			.await?
			.and_then(|raw| raw.parse().ok())
			.unwrap_or(0))
	}

	/// Serializes `data` and pushes it to the back of `list`.
	pub async fn push_back<T: Serialize>(&self, list: &str, data: &T) -> Result<(), StorageError> {
		let raw = encode(data)?;
		self.backend.list_push_back(list, &raw).await
	}

	/// Serializes `data` and pushes it to the front of `list`.
	pub async fn push_front<T: Serialize>(
		&self,
		list: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let raw = encode(data)?;
		self.backend.list_push_front(list, &raw).await
	}

	/// Peeks at and decodes the front of `list`.
	pub async fn peek_front<T: DeserializeOwned>(
		&self,
		list: &str,
	) -> Result<Option<Entry<T>>, StorageError> {
		match self.backend.list_peek_front(list).await? {
			Some(raw) => Ok(Some(decode_entry(raw)?)),
			None => Ok(None),
		}
	}

	/// Atomically moves the front of `source` to `destination` and decodes it.
	///
	/// The element is moved even if it fails to decode.
	pub async fn move_front<T: DeserializeOwned>(
		&self,
		source: &str,
		destination: &str,
	) -> Result<Option<Entry<T>>, StorageError> {
		match self.backend.list_move_front(source, destination).await? {
			Some(raw) => Ok(Some(decode_entry(raw)?)),
			None => Ok(None),
		}
	}

	/// Decodes every element of `list`, front first.
	pub async fn range<T: DeserializeOwned>(
		&self,
		list: &str,
	) -> Result<Vec<Entry<T>>, StorageError> {
		self.backend
			.list_range(list)
			.await?
			.into_iter()
			.map(decode_entry)
			.collect()
	}

	/// Removes the element stored as `raw` from `list`.
	pub async fn remove(&self, list: &str, raw: &str) -> Result<usize, StorageError> {
		self.backend.list_remove(list, raw).await
	}

	pub async fn contains(&self, list: &str, value: &str) -> Result<bool, StorageError> {
		self.backend.list_contains(list, value).await
	}

	pub async fn len(&self, list: &str) -> Result<usize, StorageError> {
		self.backend.list_len(list).await
	}

	/// Reads and decodes a hash field.
	pub async fn hash_get<T: DeserializeOwned>(
		&self,
		hash: &str,
		field: &str,
	) -> Result<Option<Entry<T>>, StorageError> {
		match self.backend.hash_get(hash, field).await? {
			Some(raw) => Ok(Some(decode_entry(raw)?)),
			None => Ok(None),
		}
	}

	/// Serializes and writes a hash field.
	pub async fn hash_set<T: Serialize>(
		&self,
		hash: &str,
		field: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let raw = encode(data)?;
		self.backend.hash_set(hash, field, &raw).await
	}

	/// Writes a hash field only if it is absent.
	pub async fn hash_set_if_absent<T: Serialize>(
		&self,
		hash: &str,
		field: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		let raw = encode(data)?;
		self.backend.hash_set_if_absent(hash, field, &raw).await
	}

	/// Swaps a hash field from the stored string `expected` to `data`.
	pub async fn hash_compare_and_set<T: Serialize>(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		let raw = encode(data)?;
		self.backend
			.hash_compare_and_set(hash, field, expected, &raw)
			.await
	}

	pub async fn hash_delete(&self, hash: &str, field: &str) -> Result<(), StorageError> {
		self.backend.hash_delete(hash, field).await
	}

	/// Deletes a hash field only if it is still stored as `expected`.
	pub async fn hash_compare_and_delete(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
	) -> Result<bool, StorageError> {
		self.backend
			.hash_compare_and_delete(hash, field, expected)
			.await
	}

	/// Decodes every value of a hash together with its field name.
	pub async fn hash_entries<T: DeserializeOwned>(
		&self,
		hash: &str,
	) -> Result<Vec<(String, Entry<T>)>, StorageError> {
		self.backend
			.hash_entries(hash)
			.await?
			.into_iter()
			.map(|(field, raw)| Ok((field, decode_entry(raw)?)))
			.collect()
	}

	pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.backend.delete(key).await
	}
}

fn encode<T: Serialize>(data: &T) -> Result<String, StorageError> {
	serde_json::to_string(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_entry<T: DeserializeOwned>(raw: String) -> Result<Entry<T>, StorageError> {
	let value = serde_json::from_str(&raw)
		.map_err(|e| StorageError::Serialization(format!("{} in {:?}", e, raw)))?;
	Ok(Entry { value, raw })
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Item {
		n: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_list_roundtrip_keeps_raw() {
		let storage = service();
		storage.push_back("items", &Item { n: 1 }).await.unwrap();
		storage.push_back("items", &Item { n: 2 }).await.unwrap();

		let head = storage.peek_front::<Item>("items").await.unwrap().unwrap();
		assert_eq!(head.value, Item { n: 1 });

		let moved = storage
			.move_front::<Item>("items", "claimed")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(moved.raw, head.raw);
		assert_eq!(storage.len("items").await.unwrap(), 1);

		assert_eq!(storage.remove("claimed", &moved.raw).await.unwrap(), 1);
		assert_eq!(storage.len("claimed").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_compare_and_set_requires_matching_raw() {
		let storage = service();
		storage.hash_set("table", "a", &Item { n: 1 }).await.unwrap();
		let current = storage
			.hash_get::<Item>("table", "a")
			.await
			.unwrap()
			.unwrap();

		assert!(storage
			.hash_compare_and_set("table", "a", &current.raw, &Item { n: 2 })
			.await
			.unwrap());
		// The old raw no longer matches.
		assert!(!storage
			.hash_compare_and_set("table", "a", &current.raw, &Item { n: 3 })
			.await
			.unwrap());

		let stored = storage
			.hash_get::<Item>("table", "a")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stored.value, Item { n: 2 });
	}

	#[tokio::test]
	async fn test_undecodable_entry_reports_serialization_error() {
		let storage = service();
		storage
			.backend()
			.list_push_back("items", "not json")
			.await
			.unwrap();

		let result = storage.peek_front::<Item>("items").await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}
}
