//! Redis storage backend.
//!
//! Lists map to Redis lists (front = left), hashes to Redis hashes. The
//! atomic primitives use `LMOVE`, `HSETNX` and a small Lua script for
//! compare-and-set or compare-and-delete, so they hold across any number of worker processes.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Direction, RedisError, Script};
use std::collections::HashMap;
use tracing::info;

const COMPARE_AND_SET: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
	redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
	return 1
end
return 0
"#;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
	return redis.call('HDEL', KEYS[1], ARGV[1])
end
return 0
"#;

impl From<RedisError> for StorageError {
	fn from(e: RedisError) -> Self {
		StorageError::Backend(e.to_string())
	}
}

/// Redis-backed storage shared by every worker.
#[derive(Clone)]
pub struct RedisStorage {
	connection: ConnectionManager,
}

impl RedisStorage {
	/// Connects to the Redis server at `url`.
	///
	/// The connection manager reconnects on its own after transient
	/// failures, so callers only see errors for the commands that failed.
	pub async fn connect(url: &str) -> Result<Self, StorageError> {
		let client = redis::Client::open(url)?;
		let connection = ConnectionManager::new(client).await?;
		info!("Connected to redis store");
		Ok(Self { connection })
	}

	fn conn(&self) -> ConnectionManager {
		self.connection.clone()
	}
}

#[async_trait]
impl StorageInterface for RedisStorage {
	async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.conn().get(key).await?)
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let _: () = self.conn().set(key, value).await?;
		Ok(())
	}

	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
		Ok(self.conn().incr(key, delta).await?)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _: () = self.conn().del(key).await?;
		Ok(())
	}

	async fn list_push_back(&self, list: &str, value: &str) -> Result<(), StorageError> {
		let _: () = self.conn().rpush(list, value).await?;
		Ok(())
	}

	async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StorageError> {
		let _: () = self.conn().lpush(list, value).await?;
		Ok(())
	}

	async fn list_peek_front(&self, list: &str) -> Result<Option<String>, StorageError> {
		Ok(self.conn().lindex(list, 0).await?)
	}

	async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StorageError> {
		Ok(self.conn().lpop(list, None).await?)
	}

	async fn list_move_front(
		&self,
		source: &str,
		destination: &str,
	) -> Result<Option<String>, StorageError> {
		Ok(self
			.conn()
			.lmove(source, destination, Direction::Left, Direction::Right)
			.await?)
	}

	async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StorageError> {
		Ok(self.conn().lrem(list, 1, value).await?)
	}

	async fn list_range(&self, list: &str) -> Result<Vec<String>, StorageError> {
		Ok(self.conn().lrange(list, 0, -1).await?)
	}

	async fn list_contains(&self, list: &str, value: &str) -> Result<bool, StorageError> {
		// Only used on short lists such as the challenge window.
		let items: Vec<String> = self.conn().lrange(list, 0, -1).await?;
		Ok(items.iter().any(|item| item == value))
	}

	async fn list_len(&self, list: &str) -> Result<usize, StorageError> {
		Ok(self.conn().llen(list).await?)
	}

	async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StorageError> {
		Ok(self.conn().hget(hash, field).await?)
	}

	async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StorageError> {
		let _: () = self.conn().hset(hash, field, value).await?;
		Ok(())
	}

	async fn hash_set_if_absent(
		&self,
		hash: &str,
		field: &str,
		value: &str,
	) -> Result<bool, StorageError> {
		Ok(self.conn().hset_nx(hash, field, value).await?)
	}

	async fn hash_compare_and_set(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
		value: &str,
	) -> Result<bool, StorageError> {
		let mut conn = self.conn();
		let swapped: i64 = Script::new(COMPARE_AND_SET)
			.key(hash)
			.arg(field)
			.arg(expected)
			.arg(value)
			.invoke_async(&mut conn)
			.await?;
		Ok(swapped == 1)
	}

	async fn hash_compare_and_delete(
		&self,
		hash: &str,
		field: &str,
		expected: &str,
	) -> Result<bool, StorageError> {
		let mut conn = self.conn();
		let deleted: i64 = Script::new(COMPARE_AND_DELETE)
			.key(hash)
			.arg(field)
			.arg(expected)
			.invoke_async(&mut conn)
			.await?;
		Ok(deleted == 1)
	}

	async fn hash_delete(&self, hash: &str, field: &str) -> Result<(), StorageError> {
		let _: () = self.conn().hdel(hash, field).await?;
		Ok(())
	}

	async fn hash_entries(&self, hash: &str) -> Result<Vec<(String, String)>, StorageError> {
		let entries: HashMap<String, String> = self.conn().hgetall(hash).await?;
		Ok(entries.into_iter().collect())
	}
}
