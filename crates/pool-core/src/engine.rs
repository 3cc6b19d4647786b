//! Worker loops.
//!
//! A worker runs three independent loops against the shared store: chain
//! parameter polling, broadcast scheduling and receipt reconciliation. Each
//! loop waits a fixed delay after a tick completes, so a slow ledger call
//! postpones the next tick instead of overlapping it.

use crate::context::CoordinatorContext;
use crate::error::CoreError;
use crate::params::ChainParameterPoller;
use crate::reconciler::Reconciler;
use crate::scheduler::BroadcastScheduler;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// One replica of the coordinator.
pub struct CoordinatorWorker {
	worker_id: String,
	ctx: Arc<CoordinatorContext>,
	poller: ChainParameterPoller,
	scheduler: BroadcastScheduler,
	reconciler: Reconciler,
}

impl CoordinatorWorker {
	pub fn new(ctx: Arc<CoordinatorContext>, worker_id: impl Into<String>) -> Self {
		let worker_id = worker_id.into();
		Self {
			poller: ChainParameterPoller::new(ctx.clone()),
			scheduler: BroadcastScheduler::new(ctx.clone(), &worker_id),
			worker_id,
			reconciler: Reconciler::new(ctx.clone()),
			ctx,
		}
	}

	pub fn worker_id(&self) -> &str {
		&self.worker_id
	}

	/// Spawns the worker's loops on `tracker`. Each loop stops after its
	/// current tick once `token` is cancelled.
	pub fn spawn(self: Arc<Self>, tracker: &TaskTracker, token: &CancellationToken) {
		let settings = &self.ctx.settings;
		info!(worker = %self.worker_id, "Starting coordinator worker");

		let worker = self.clone();
		tracker.spawn(run_loop(
			"poll",
			self.worker_id.clone(),
			settings.poll_interval(),
			token.child_token(),
			move || {
				let worker = worker.clone();
				async move { worker.poller.poll_once().await.map(|_| ()) }
			},
		));

		let worker = self.clone();
		tracker.spawn(run_loop(
			"broadcast",
			self.worker_id.clone(),
			settings.broadcast_interval(),
			token.child_token(),
			move || {
				let worker = worker.clone();
				async move {
					let outcome = worker.scheduler.tick().await?;
					debug!(worker = %worker.worker_id, outcome = ?outcome, "Broadcast tick");
					Ok(())
				}
			},
		));

		let worker = self.clone();
		tracker.spawn(run_loop(
			"reconcile",
			self.worker_id.clone(),
			settings.reconcile_interval(),
			token.child_token(),
			move || {
				let worker = worker.clone();
				async move { worker.reconciler.tick().await.map(|_| ()) }
			},
		));
	}
}

/// Runs `tick` until `token` is cancelled, sleeping `interval` after each
/// completed tick. Tick errors are logged and never end the loop.
async fn run_loop<F, Fut>(
	name: &'static str,
	worker_id: String,
	interval: Duration,
	token: CancellationToken,
	mut tick: F,
) where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<(), CoreError>>,
{
	loop {
		if token.is_cancelled() {
			break;
		}
		if let Err(e) = tick().await {
			warn!(worker = %worker_id, task = name, error = %e, "Tick failed");
		}
		tokio::select! {
			_ = token.cancelled() => break,
			_ = tokio::time::sleep(interval) => {}
		}
	}
	debug!(worker = %worker_id, task = name, "Loop stopped");
}
