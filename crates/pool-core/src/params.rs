//! Chain parameter polling and challenge deduplication.
//!
//! Every worker polls the token contract on its own timer and writes the
//! result to the shared store. Writes are plain overwrites, so concurrent
//! pollers converge on the latest observation.

use crate::context::CoordinatorContext;
use crate::error::CoreError;
use crate::keys;
use pool_storage::{StorageError, StorageService};
use pool_types::{ChainParameters, B256, U256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of recent challenges remembered for deduplication.
pub const CHALLENGE_WINDOW_SIZE: usize = 5;

/// Placeholder occupying unused window slots.
const SENTINEL: &str = "-";

/// Fixed-size FIFO of recently seen challenge numbers.
///
/// The window holds [`CHALLENGE_WINDOW_SIZE`] entries once seeded:
/// observing a challenge appends it and evicts the oldest.
pub struct RecentChallengeWindow {
	storage: Arc<StorageService>,
}

impl RecentChallengeWindow {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Pads the window with sentinel placeholders up to its size. Entries
	/// already present are kept, so seeding a running cluster's window
	/// changes nothing.
	pub async fn seed(&self) -> Result<(), StorageError> {
		let backend = self.storage.backend();
		let present = backend.list_len(keys::RECENT_CHALLENGES).await?;
		for _ in present..CHALLENGE_WINDOW_SIZE {
			backend
				.list_push_front(keys::RECENT_CHALLENGES, SENTINEL)
				.await?;
		}
		Ok(())
	}

	pub async fn contains(&self, challenge: &B256) -> Result<bool, StorageError> {
		self.storage
			.contains(keys::RECENT_CHALLENGES, &challenge.to_string())
			.await
	}

	/// Pushes `challenge` and evicts the oldest entry.
	pub async fn observe(&self, challenge: &B256) -> Result<(), StorageError> {
		let backend = self.storage.backend();
		backend
			.list_push_back(keys::RECENT_CHALLENGES, &challenge.to_string())
			.await?;
		backend.list_pop_front(keys::RECENT_CHALLENGES).await?;
		Ok(())
	}

	pub async fn entries(&self) -> Result<Vec<String>, StorageError> {
		self.storage
			.backend()
			.list_range(keys::RECENT_CHALLENGES)
			.await
	}
}

/// Reads mining parameters from the ledger and persists them.
pub struct ChainParameterPoller {
	ctx: Arc<CoordinatorContext>,
	window: RecentChallengeWindow,
}

impl ChainParameterPoller {
	pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
		let window = RecentChallengeWindow::new(ctx.storage.clone());
		Self { ctx, window }
	}

	pub async fn seed_window(&self) -> Result<(), StorageError> {
		self.window.seed().await
	}

	/// Runs one poll. Returns the challenge number if it was genuinely new.
	pub async fn poll_once(&self) -> Result<Option<B256>, CoreError> {
		let ledger = &self.ctx.ledger;
		let storage = &self.ctx.storage;

		let difficulty = ledger.mining_difficulty().await?;
		let target = ledger.mining_target().await?;
		let challenge = ledger.challenge_number().await?;
		let block = ledger.block_number().await?;

		let mut fresh = None;
		let last_known = storage.get(keys::CHALLENGE_NUMBER).await?;
		if last_known.as_deref() != Some(challenge.to_string().as_str()) {
			if self.window.contains(&challenge).await? {
				debug!(challenge = %challenge, "Ignoring re-observed challenge");
			} else {
				self.window.observe(&challenge).await?;
				storage
					.set(keys::CHALLENGE_NUMBER, &challenge.to_string())
					.await?;
				info!(challenge = %challenge, block, "New challenge");
				fresh = Some(challenge);
			}
		}

		storage
			.set(keys::MINING_DIFFICULTY, &difficulty.to_string())
			.await?;
		storage.set(keys::MINING_TARGET, &target.to_string()).await?;
		storage
			.set(keys::ETH_BLOCK_NUMBER, &block.to_string())
			.await?;

		Ok(fresh)
	}
}

/// Last persisted ledger height, or zero if none was ever recorded.
pub async fn current_block(storage: &StorageService) -> Result<u64, StorageError> {
	Ok(storage
		.get(keys::ETH_BLOCK_NUMBER)
		.await?
		.and_then(|raw| raw.parse::<u64>().ok())
		.unwrap_or(0))
}

pub async fn current_challenge(storage: &StorageService) -> Result<Option<B256>, StorageError> {
	Ok(storage
		.get(keys::CHALLENGE_NUMBER)
		.await?
		.and_then(|raw| B256::from_str(&raw).ok()))
}

async fn read_u256(storage: &StorageService, key: &str) -> Result<U256, StorageError> {
	Ok(storage
		.get(key)
		.await?
		.and_then(|raw| U256::from_str(&raw).ok())
		.unwrap_or_default())
}

/// Reads the persisted chain parameters. Missing values read as zero.
pub async fn read_chain_parameters(
	storage: &StorageService,
) -> Result<ChainParameters, StorageError> {
	Ok(ChainParameters {
		difficulty: read_u256(storage, keys::MINING_DIFFICULTY).await?,
		target: read_u256(storage, keys::MINING_TARGET).await?,
		challenge_number: current_challenge(storage).await?,
		last_seen_ledger_block: current_block(storage).await?,
	})
}
