//! Builds, signs and submits pool transactions.
//!
//! Submission is split in two so the caller can persist the signed hash
//! before the bytes leave the process.

use crate::context::CoordinatorContext;
use crate::error::BroadcastError;
use alloy_sol_types::SolCall;
use pool_account::AccountService;
use pool_types::abi::{IMineableToken, IMintHelper};
use pool_types::{
	short_hash, Address, Bytes, CallRequest, RawTransaction, SignedTransaction, TxPayload, B256,
	U256,
};
use std::sync::Arc;
use tracing::{debug, warn};

const GWEI: u128 = 1_000_000_000;

/// A signed transaction that has not been sent yet.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
	pub signed: SignedTransaction,
	pub sender: Address,
	pub nonce: u64,
	pub gas_limit: u64,
	pub gas_price: u128,
	/// Auxiliary tokens included in a solution submission.
	pub merge_mint_addresses: Vec<Address>,
}

pub struct Submitter {
	ctx: Arc<CoordinatorContext>,
}

impl Submitter {
	pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
		Self { ctx }
	}

	fn account_for(&self, payload: &TxPayload) -> &Arc<AccountService> {
		match payload {
			TxPayload::Solution(_) => &self.ctx.minting_account,
			TxPayload::Transfer(_) => &self.ctx.payment_account,
		}
	}

	/// Draws the nonce, sizes gas and signs.
	pub async fn prepare(&self, payload: &TxPayload) -> Result<PreparedTransaction, BroadcastError> {
		let ledger = &self.ctx.ledger;
		let gas = &self.ctx.settings.gas;
		let account = self.account_for(payload);
		let sender = account.get_address().await?;

		let (to, data, merge_mint_addresses) = match payload {
			TxPayload::Solution(solution) => {
				let tokens = self
					.ctx
					.merge_mint
					.resolve(sender, solution.solution_number, solution.challenge_digest)
					.await;
				let data = IMintHelper::proxyMergeMintCall {
					nonce: solution.solution_number,
					challenge_digest: solution.challenge_digest,
					tokens: tokens.clone(),
				}
				.abi_encode();
				(self.ctx.settings.mint_helper, Bytes::from(data), tokens)
			}
			TxPayload::Transfer(transfer) => {
				let data = IMineableToken::transferCall {
					to: transfer.address_to,
					tokens: transfer.token_amount,
				}
				.abi_encode();
				(self.ctx.settings.token_contract, Bytes::from(data), Vec::new())
			}
		};

		let call = CallRequest::new(sender, to, data.clone()).with_gas(gas.ceiling);
		let estimate = ledger.estimate_gas(&call).await?;
		if estimate > gas.ceiling {
			return Err(BroadcastError::GasEstimateExceeded {
				estimate,
				ceiling: gas.ceiling,
			});
		}

		let (gas_limit, gas_price) = match payload {
			TxPayload::Solution(_) => {
				let padded = (estimate as f64 * gas.estimate_multiplier).ceil() as u64;
				let gas_limit = padded.max(gas.solution_floor);
				if gas_limit > gas.ceiling {
					return Err(BroadcastError::GasEstimateExceeded {
						estimate: gas_limit,
						ceiling: gas.ceiling,
					});
				}
				let network = ledger.gas_price().await?;
				let gas_price = (network as f64 * gas.solution_gas_price_multiplier) as u128;
				(gas_limit, gas_price)
			}
			TxPayload::Transfer(_) => {
				(gas.ceiling, gas.transfer_gas_price_gwei as u128 * GWEI)
			}
		};

		let nonce = ledger.transaction_count(sender).await?;

		let raw = RawTransaction {
			chain_id: self.ctx.settings.chain_id,
			nonce,
			gas_limit,
			gas_price,
			to,
			value: U256::ZERO,
			data,
		};
		let signed = account.sign(&raw).await?;

		debug!(
			tx_hash = %short_hash(&signed.hash),
			class = %payload.class(),
			nonce,
			gas_limit,
			gas_price,
			"Signed transaction"
		);

		Ok(PreparedTransaction {
			signed,
			sender,
			nonce,
			gas_limit,
			gas_price,
			merge_mint_addresses,
		})
	}

	/// Submits prepared bytes and returns the transaction hash.
	pub async fn send(&self, prepared: &PreparedTransaction) -> Result<B256, BroadcastError> {
		let hash = self
			.ctx
			.ledger
			.send_raw_transaction(&prepared.signed.raw)
			.await?;
		if hash != prepared.signed.hash {
			warn!(
				returned = %hash,
				signed = %prepared.signed.hash,
				"Ledger returned a different hash than was signed"
			);
		}
		Ok(prepared.signed.hash)
	}
}
