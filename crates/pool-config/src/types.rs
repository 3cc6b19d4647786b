//! Configuration types.
//!
//! Every section except `[ledger]` and `[accounts]` has defaults, so a
//! minimal file only names the RPC endpoint, the contracts and the keys.

use pool_types::Address;
use serde::Deserialize;
use std::fmt;

/// Top-level pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
	#[serde(default)]
	pub pool: PoolSettings,
	pub ledger: LedgerConfig,
	pub accounts: AccountsConfig,
	#[serde(default)]
	pub storage: StorageConfig,
	#[serde(default)]
	pub gas: GasConfig,
	#[serde(default)]
	pub coordinator: CoordinatorConfig,
	#[serde(default)]
	pub merge_mint: MergeMintConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
	#[serde(default = "default_pool_name")]
	pub name: String,
	/// Number of workers to run against the shared store.
	#[serde(default = "default_replicas")]
	pub replicas: usize,
	/// Prefix of this process's worker ids. Must differ between processes
	/// sharing one store; a random id is used when unset.
	#[serde(default)]
	pub instance_id: Option<String>,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for PoolSettings {
	fn default() -> Self {
		Self {
			name: default_pool_name(),
			replicas: default_replicas(),
			instance_id: None,
			log_level: default_log_level(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
	pub rpc_url: String,
	pub chain_id: u64,
	/// The mineable token contract.
	pub token_contract: Address,
	/// Contract that receives solution submissions.
	pub mint_helper: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
	/// Signs solution submissions.
	pub minting: AccountConfig,
	/// Signs payout transfers.
	pub payment: AccountConfig,
}

#[derive(Clone, Deserialize)]
pub struct AccountConfig {
	pub private_key: String,
}

impl fmt::Debug for AccountConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AccountConfig")
			.field("private_key", &"<redacted>")
			.finish()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	Memory,
	Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
	#[serde(default = "default_backend")]
	pub backend: StorageBackend,
	#[serde(default = "default_redis_url")]
	pub redis_url: String,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_backend(),
			redis_url: default_redis_url(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
	/// Hard ceiling on any gas estimate. Also the transfer gas limit.
	#[serde(default = "default_gas_ceiling")]
	pub ceiling: u64,
	/// Minimum gas limit for solution submissions.
	#[serde(default = "default_solution_floor")]
	pub solution_floor: u64,
	#[serde(default = "default_multiplier")]
	pub estimate_multiplier: f64,
	#[serde(default = "default_multiplier")]
	pub solution_gas_price_multiplier: f64,
	#[serde(default = "default_transfer_gas_price_gwei")]
	pub transfer_gas_price_gwei: u64,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			ceiling: default_gas_ceiling(),
			solution_floor: default_solution_floor(),
			estimate_multiplier: default_multiplier(),
			solution_gas_price_multiplier: default_multiplier(),
			transfer_gas_price_gwei: default_transfer_gas_price_gwei(),
		}
	}
}

/// Loop intervals and reconciliation/retry thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_broadcast_interval_ms")]
	pub broadcast_interval_ms: u64,
	#[serde(default = "default_reconcile_interval_ms")]
	pub reconcile_interval_ms: u64,
	/// Blocks without a receipt before a pending transaction is lost.
	#[serde(default = "default_lost_block_threshold")]
	pub lost_block_threshold: u64,
	#[serde(default = "default_max_broadcast_attempts")]
	pub max_broadcast_attempts: u32,
	#[serde(default = "default_retry_backoff_ms")]
	pub retry_backoff_ms: u64,
	#[serde(default = "default_retry_backoff_max_ms")]
	pub retry_backoff_max_ms: u64,
	/// A worker whose heartbeat is older than this is presumed dead, and a
	/// broadcast slot held longer than this may be taken over.
	#[serde(default = "default_lease_timeout_ms")]
	pub lease_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			broadcast_interval_ms: default_broadcast_interval_ms(),
			reconcile_interval_ms: default_reconcile_interval_ms(),
			lost_block_threshold: default_lost_block_threshold(),
			max_broadcast_attempts: default_max_broadcast_attempts(),
			retry_backoff_ms: default_retry_backoff_ms(),
			retry_backoff_max_ms: default_retry_backoff_max_ms(),
			lease_timeout_ms: default_lease_timeout_ms(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeMintConfig {
	/// Tokens probed for merge-mint eligibility on every solution.
	#[serde(default)]
	pub candidates: Vec<Address>,
}

fn default_pool_name() -> String {
	"mining-pool".to_string()
}

fn default_replicas() -> usize {
	1
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_backend() -> StorageBackend {
	StorageBackend::Memory
}

fn default_redis_url() -> String {
	"redis://127.0.0.1:6379".to_string()
}

fn default_gas_ceiling() -> u64 {
	1_704_624
}

fn default_solution_floor() -> u64 {
	305_830
}

fn default_multiplier() -> f64 {
	1.2
}

fn default_transfer_gas_price_gwei() -> u64 {
	2
}

fn default_poll_interval_ms() -> u64 {
	2000
}

fn default_broadcast_interval_ms() -> u64 {
	1000
}

fn default_reconcile_interval_ms() -> u64 {
	2000
}

fn default_lost_block_threshold() -> u64 {
	50
}

fn default_max_broadcast_attempts() -> u32 {
	3
}

fn default_retry_backoff_ms() -> u64 {
	2000
}

fn default_retry_backoff_max_ms() -> u64 {
	60_000
}

fn default_lease_timeout_ms() -> u64 {
	30_000
}
