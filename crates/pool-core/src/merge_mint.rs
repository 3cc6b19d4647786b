//! Resolution of auxiliary tokens to merge-mint alongside the primary one.

use async_trait::async_trait;
use alloy_sol_types::SolCall;
use pool_ledger::LedgerInterface;
use pool_types::abi::IMintHelper;
use pool_types::{Address, CallRequest, B256, U256};
use std::sync::Arc;
use tracing::debug;

/// Produces the auxiliary token addresses a solution should also mint.
#[async_trait]
pub trait MergeMintResolver: Send + Sync {
	async fn resolve(
		&self,
		from: Address,
		solution_number: U256,
		challenge_digest: B256,
	) -> Vec<Address>;
}

/// Keeps every candidate whose single-token `proxyMergeMint` estimates
/// successfully under the gas ceiling.
pub struct ProbingMergeMintResolver {
	ledger: Arc<dyn LedgerInterface>,
	mint_helper: Address,
	candidates: Vec<Address>,
	ceiling: u64,
}

impl ProbingMergeMintResolver {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		mint_helper: Address,
		candidates: Vec<Address>,
		ceiling: u64,
	) -> Self {
		Self {
			ledger,
			mint_helper,
			candidates,
			ceiling,
		}
	}
}

#[async_trait]
impl MergeMintResolver for ProbingMergeMintResolver {
	async fn resolve(
		&self,
		from: Address,
		solution_number: U256,
		challenge_digest: B256,
	) -> Vec<Address> {
		let mut working = Vec::new();
		for candidate in &self.candidates {
			let data = IMintHelper::proxyMergeMintCall {
				nonce: solution_number,
				challenge_digest,
				tokens: vec![*candidate],
			}
			.abi_encode();
			let call = CallRequest::new(from, self.mint_helper, data.into()).with_gas(self.ceiling);

			match self.ledger.estimate_gas(&call).await {
				Ok(estimate) if estimate <= self.ceiling => working.push(*candidate),
				Ok(estimate) => {
					debug!(token = %candidate, estimate, "Merge-mint candidate over gas ceiling")
				}
				Err(e) => debug!(token = %candidate, error = %e, "Merge-mint candidate rejected"),
			}
		}
		working
	}
}
