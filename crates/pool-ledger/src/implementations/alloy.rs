//! Alloy-based ledger client.
//!
//! Talks JSON-RPC over HTTP. Contract reads are encoded with the `sol!`
//! bindings from `pool_types::abi` and sent as `eth_call`.

use crate::{LedgerError, LedgerInterface};
use alloy_consensus::Transaction as _;
use alloy_primitives::TxKind;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use alloy_transport_http::Http;
use async_trait::async_trait;
use pool_types::abi::IMineableToken;
use pool_types::{
	short_hash, Address, Bytes, CallRequest, LedgerReceipt, LedgerTransaction, ReceiptStatus,
	B256, U256,
};
use std::sync::Arc;

/// Alloy-based ledger client bound to one token contract.
pub struct AlloyLedger {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	/// The mineable token whose parameters are read.
	token_contract: Address,
}

impl AlloyLedger {
	pub fn new(rpc_url: &str, token_contract: Address) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Unavailable(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new().on_http(url);

		Ok(Self {
			provider: Arc::new(provider),
			token_contract,
		})
	}

	/// Calls a view function on the token contract and decodes its output.
	async fn call_token<C: SolCall>(&self, call: C) -> Result<C::Return, LedgerError> {
		let request = TransactionRequest {
			to: Some(TxKind::Call(self.token_contract)),
			input: TransactionInput::new(call.abi_encode().into()),
			..Default::default()
		};

		let output = self
			.provider
			.call(&request)
			.await
			.map_err(|e| classify(format!("{} failed", C::SIGNATURE), e))?;

		decode_returns::<C>(&output)
	}
}

fn decode_returns<C: SolCall>(output: &[u8]) -> Result<C::Return, LedgerError> {
	C::abi_decode_returns(output, true)
		.map_err(|e| LedgerError::Decode(format!("{}: {}", C::SIGNATURE, e)))
}

/// Error responses from the node are rejections; anything else is a
/// transport failure.
fn classify(context: String, error: alloy_transport::TransportError) -> LedgerError {
	if error.is_error_resp() {
		LedgerError::Rejected(format!("{}: {}", context, error))
	} else {
		LedgerError::Unavailable(format!("{}: {}", context, error))
	}
}

fn to_request(call: &CallRequest) -> TransactionRequest {
	TransactionRequest {
		from: Some(call.from),
		to: Some(TxKind::Call(call.to)),
		input: TransactionInput::new(call.data.clone()),
		value: Some(call.value),
		gas: call.gas,
		..Default::default()
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	async fn mining_difficulty(&self) -> Result<U256, LedgerError> {
		Ok(self
			.call_token(IMineableToken::getMiningDifficultyCall {})
			.await?
			._0)
	}

	async fn mining_target(&self) -> Result<U256, LedgerError> {
		Ok(self.call_token(IMineableToken::getMiningTargetCall {}).await?._0)
	}

	async fn challenge_number(&self) -> Result<B256, LedgerError> {
		Ok(self
			.call_token(IMineableToken::getChallengeNumberCall {})
			.await?
			._0)
	}

	async fn mining_reward(&self) -> Result<U256, LedgerError> {
		Ok(self.call_token(IMineableToken::getMiningRewardCall {}).await?._0)
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| classify("Failed to get block number".to_string(), e))
	}

	async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
		self.provider
			.get_transaction_count(address)
			.await
			.map_err(|e| classify("Failed to get transaction count".to_string(), e))
	}

	async fn gas_price(&self) -> Result<u128, LedgerError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| classify("Failed to get gas price".to_string(), e))
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
		let request = to_request(call);
		self.provider
			.estimate_gas(&request)
			.await
			.map_err(|e| classify("Gas estimation failed".to_string(), e))
	}

	async fn transaction(&self, hash: B256) -> Result<Option<LedgerTransaction>, LedgerError> {
		let tx = self
			.provider
			.get_transaction_by_hash(hash)
			.await
			.map_err(|e| classify("Failed to get transaction".to_string(), e))?;

		Ok(tx.map(|tx| LedgerTransaction {
			tx_hash: hash,
			block_number: tx.block_number,
			nonce: tx.nonce(),
		}))
	}

	async fn transaction_receipt(&self, hash: B256) -> Result<Option<LedgerReceipt>, LedgerError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| classify("Failed to get receipt".to_string(), e))?;

		Ok(receipt.map(|receipt| LedgerReceipt {
			tx_hash: receipt.transaction_hash,
			block_number: receipt.block_number,
			status: ReceiptStatus::Flag(receipt.status()),
		}))
	}

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, LedgerError> {
		let pending_tx = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(|e| classify("Failed to send transaction".to_string(), e))?;

		let tx_hash = *pending_tx.tx_hash();
		tracing::info!(tx_hash = %short_hash(&tx_hash), "Submitted transaction");

		Ok(tx_hash)
	}
}
