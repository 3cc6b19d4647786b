//! Shared handles passed to every coordinator component.

use crate::merge_mint::MergeMintResolver;
use pool_account::AccountService;
use pool_config::{CoordinatorConfig, GasConfig, PoolConfig};
use pool_ledger::LedgerInterface;
use pool_storage::StorageService;
use pool_types::Address;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ledger addresses, gas rules and loop timing, resolved from configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
	/// Prefix shared by the worker ids of this process.
	pub instance_id: String,
	pub chain_id: u64,
	pub token_contract: Address,
	pub mint_helper: Address,
	pub gas: GasConfig,
	pub coordinator: CoordinatorConfig,
	pub merge_mint_candidates: Vec<Address>,
}

impl Default for CoordinatorSettings {
	fn default() -> Self {
		Self {
			instance_id: random_instance_id(),
			chain_id: 1,
			token_contract: Address::ZERO,
			mint_helper: Address::ZERO,
			gas: GasConfig::default(),
			coordinator: CoordinatorConfig::default(),
			merge_mint_candidates: Vec::new(),
		}
	}
}

impl CoordinatorSettings {
	pub fn from_config(config: &PoolConfig) -> Self {
		Self {
			instance_id: config
				.pool
				.instance_id
				.clone()
				.unwrap_or_else(random_instance_id),
			chain_id: config.ledger.chain_id,
			token_contract: config.ledger.token_contract,
			mint_helper: config.ledger.mint_helper,
			gas: config.gas.clone(),
			coordinator: config.coordinator.clone(),
			merge_mint_candidates: config.merge_mint.candidates.clone(),
		}
	}

	/// Store-wide identity of worker `index` of this process.
	pub fn worker_id(&self, index: usize) -> String {
		format!("{}-{}", self.instance_id, index)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.coordinator.poll_interval_ms)
	}

	pub fn broadcast_interval(&self) -> Duration {
		Duration::from_millis(self.coordinator.broadcast_interval_ms)
	}

	pub fn reconcile_interval(&self) -> Duration {
		Duration::from_millis(self.coordinator.reconcile_interval_ms)
	}
}

fn random_instance_id() -> String {
	let mut id = Uuid::new_v4().simple().to_string();
	id.truncate(8);
	id
}

/// Built once by [`crate::CoordinatorBuilder`] and shared by every worker.
pub struct CoordinatorContext {
	pub settings: CoordinatorSettings,
	pub storage: Arc<StorageService>,
	pub ledger: Arc<dyn LedgerInterface>,
	/// Signs solution submissions.
	pub minting_account: Arc<AccountService>,
	/// Signs payout transfers.
	pub payment_account: Arc<AccountService>,
	pub merge_mint: Arc<dyn MergeMintResolver>,
}
