//! Wires configuration to backends and runs the worker replicas.

use anyhow::{Context, Result};
use pool_account::LocalWallet;
use pool_config::{PoolConfig, StorageBackend, StorageConfig};
use pool_core::{CoordinatorBuilder, CoordinatorSettings, PoolCoordinator};
use pool_ledger::AlloyLedger;
use pool_storage::{MemoryStorage, RedisStorage, StorageInterface};
use pool_types::{ChainParameters, TransactionStatistics};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Upper bound on waiting for in-progress ticks after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Broadcasts listed by `stats`.
const RECENT_IN_REPORT: usize = 10;

pub struct PoolService {
	coordinator: PoolCoordinator,
	replicas: usize,
}

impl PoolService {
	pub async fn new(config: PoolConfig) -> Result<Self> {
		let storage = build_storage(&config.storage).await?;
		let ledger = AlloyLedger::new(&config.ledger.rpc_url, config.ledger.token_contract)
			.context("Failed to create ledger client")?;
		let minting = LocalWallet::new(&config.accounts.minting.private_key)
			.context("Invalid minting key")?;
		let payment = LocalWallet::new(&config.accounts.payment.private_key)
			.context("Invalid payment key")?;

		let coordinator = CoordinatorBuilder::new(CoordinatorSettings::from_config(&config))
			.with_storage(storage)
			.with_ledger(Arc::new(ledger))
			.with_minting_account(Box::new(minting))
			.with_payment_account(Box::new(payment))
			.build()?;

		Ok(Self {
			coordinator,
			replicas: config.pool.replicas,
		})
	}

	/// Runs the workers until `shutdown` resolves, then stops them after
	/// their current tick.
	pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
		self.coordinator.seed_challenge_window().await?;

		let tracker = TaskTracker::new();
		let token = CancellationToken::new();
		let workers = self
			.coordinator
			.spawn_workers(self.replicas, &tracker, &token);
		tracker.close();
		let ids: Vec<&str> = workers.iter().map(|worker| worker.worker_id()).collect();
		info!(workers = ?ids, "Pool coordinator started");

		shutdown.await;
		info!("Shutdown signal received, stopping workers");
		token.cancel();

		if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait())
			.await
			.is_err()
		{
			warn!("Workers did not stop within the grace period");
		}
		Ok(())
	}

	pub async fn report(&self) -> Result<serde_json::Value> {
		let parameters: ChainParameters = self.coordinator.chain_parameters().await?;
		let statistics: TransactionStatistics = self.coordinator.statistics().await?;
		let lost = self.coordinator.lost_transactions().await?.len();
		let failed = self.coordinator.failed_requests().await?.len();
		let recent: Vec<_> = self
			.coordinator
			.recent_transactions(RECENT_IN_REPORT)
			.await?
			.into_iter()
			.map(|tx| {
				json!({
					"tx_hash": tx.tx_hash,
					"class": tx.class(),
					"status": tx.status,
					"broadcast_block": tx.broadcast_block,
				})
			})
			.collect();

		Ok(json!({
			"chain": parameters,
			"transactions": statistics,
			"lost": lost,
			"failed": failed,
			"recent": recent,
		}))
	}
}

async fn build_storage(config: &StorageConfig) -> Result<Box<dyn StorageInterface>> {
	match config.backend {
		StorageBackend::Memory => {
			warn!("Using in-memory storage; state is lost on restart");
			Ok(Box::new(MemoryStorage::new()))
		}
		StorageBackend::Redis => {
			let storage = RedisStorage::connect(&config.redis_url)
				.await
				.context("Failed to connect to redis")?;
			Ok(Box::new(storage))
		}
	}
}
