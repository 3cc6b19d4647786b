//! In-memory storage implementation.
//!
//! A single lock guards all keys, which makes every operation trivially
//! atomic. Suitable for tests and single-process runs; nothing survives a
//! restart.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
	scalars: HashMap<String, String>,
	lists: HashMap<String, VecDeque<String>>,
	hashes: HashMap<String, HashMap<String, String>>,
}

/// In-memory storage implementation
#[derive(Default)]
pub struct MemoryStorage {
	state: Mutex<MemoryState>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.state.lock().await.scalars.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.state
			.lock()
			.await
			.scalars
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
		let mut state = self.state.lock().await;
		let current = match state.scalars.get(key) {
			Some(raw) => raw.parse::<i64>().map_err(|_| {
				StorageError::Backend(format!("value at {} is not an integer", key))
			})?,
			None => 0,
		};
		let next = current + delta;
		state.scalars.insert(key.to_string(), next.to_string());
		Ok(next)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut state = self.state.lock().await;
		state.scalars.remove(key);
		state.lists.remove(key);
		state.hashes.remove(key);
		Ok(())
	}

	async fn list_push_back(&self, list: &str, value: &str) -> Result<(), StorageError> {
		self.state
			.lock()
			.await
			.lists
			.entry(list.to_string())
			.or_default()
			.push_back(value.to_string());
		Ok(())
	}

	async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StorageError> {
		self.state
			.lock()
			.await
			.lists
			.entry(list.to_string())
			.or_default()
			.push_front(value.to_string());
		Ok(())
	}

	async fn list_peek_front(&self, list: &str) -> Result<Option<String>, StorageError> {
		let state = self.state.lock().await;
		Ok(state.lists.get(list).and_then(|l| l.front().cloned()))
	}

	async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StorageError> {
		let mut state = self.state.lock().await;
		Ok(state.lists.get_mut(list).and_then(|l| l.pop_front()))
	}

	async fn list_move_front(
		&self,
		source: &str,
		destination: &str,
	) -> Result<Option<String>, StorageError> {
		let mut state = self.state.lock().await;
		let Some(value) = state.lists.get_mut(source).and_then(|l| l.pop_front()) else {
			return Ok(None);
		};
		state
			.lists
			.entry(destination.to_string())
			.or_default()
			.push_back(value.clone());
		Ok(Some(value))
	}

	async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StorageError> {
		let mut state = self.state.lock().await;
		let Some(items) = state.lists.get_mut(list) else {
			return Ok(0);
		};
		match items.iter().position(|item| item == value) {
			Some(index) => {
				items.remove(index);
				Ok(1)
			}
			None => Ok(0),
		}
	}

	async fn list_range(&self, list: &str) -> Result<Vec<String>, StorageError> {
		let state = self.state.lock().await;
		Ok(state
			.lists
			.get(list)
			.map(|l| l.iter().cloned().collect())
			.unwrap_or_default())
	}

	async fn list_contains(&self, list: &str, value: &str) -> Result<bool, StorageError> {
		let state = self.state.lock().await;
		Ok(state
			.lists
			.get(list)
			.is_some_and(|l| l.iter().any(|item| item == value)))
	}

	async fn list_len(&self, list: &str) -> Result<usize, StorageError> {
		let state = self.state.lock().await;
		Ok(state.lists.get(list).map_or(0, |l| l.len()))
	}

	async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StorageError> {
		let state = self.state.lock().await;
		Ok(state.hashes.get(hash).and_then(|h| h.get(field).cloned()))
	}

	async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StorageError> {
		self.state
			.lock()
			.await
			.hashes
			.entry(hash.to_string())
			.or_default()
			.insert(field.to_string(), value.to_string());
		Ok(())
	}

	async fn hash_set_if_absent(
		&self,
		hash: &str,
		field: &str,
		value: &str,
	) -> Result<bool, StorageError> {
		let mut state = self.state.lock().await;
		let table = state.hashes.entry(hash.to_string()).or_default();
		if table.contains_key(field) {
			return Ok(false);
		}
		table.insert(field.to_string(), value.to_string());
		Ok(true)
	}

	async fn hash_compare_and_set(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
		value: &str,
	) -> Result<bool, StorageError> {
		let mut state = self.state.lock().await;
		let Some(current) = state.hashes.get_mut(hash).and_then(|h| h.get_mut(field)) else {
			return Ok(false);
		};
		if current != expected {
			return Ok(false);
		}
		*current = value.to_string();
		Ok(true)
	}

	async fn hash_compare_and_delete(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
	) -> Result<bool, StorageError> {
		let mut state = self.state.lock().await;
		let Some(table) = state.hashes.get_mut(hash) else {
			return Ok(false);
		};
		if table.get(field).map(String::as_str) != Some(expected) {
			return Ok(false);
		}
		table.remove(field);
		Ok(true)
	}

	async fn hash_delete(&self, hash: &str, field: &str) -> Result<(), StorageError> {
		let mut state = self.state.lock().await;
		if let Some(table) = state.hashes.get_mut(hash) {
			table.remove(field);
		}
		Ok(())
	}

	async fn hash_entries(&self, hash: &str) -> Result<Vec<(String, String)>, StorageError> {
		let state = self.state.lock().await;
		Ok(state
			.hashes
			.get(hash)
			.map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
			.unwrap_or_default())
	}
}
