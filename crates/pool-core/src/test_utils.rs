//! Hand-written ledger and account mocks shared by the unit tests.

use crate::context::{CoordinatorContext, CoordinatorSettings};
use crate::merge_mint::ProbingMergeMintResolver;
use alloy_primitives::keccak256;
use async_trait::async_trait;
use pool_account::{AccountError, AccountInterface, AccountService};
use pool_ledger::{LedgerError, LedgerInterface};
use pool_storage::{MemoryStorage, StorageService};
use pool_types::{
	Address, Bytes, CallRequest, LedgerReceipt, LedgerTransaction, RawTransaction, ReceiptStatus,
	SignedTransaction, B256, U256,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub const TOKEN: Address = Address::repeat_byte(0x70);
pub const MINT_HELPER: Address = Address::repeat_byte(0x71);
pub const MINTING_ADDRESS: Address = Address::repeat_byte(0xa1);
pub const PAYMENT_ADDRESS: Address = Address::repeat_byte(0xa2);

#[derive(Default)]
pub struct LedgerState {
	pub difficulty: U256,
	pub target: U256,
	pub challenges: VecDeque<B256>,
	pub challenge: B256,
	pub reward: U256,
	pub block: u64,
	pub gas_price: u128,
	pub estimate: u64,
	/// Gas estimates for calls whose calldata contains this address fail.
	pub reverting_tokens: HashSet<Address>,
	pub unavailable: bool,
	pub reject_sends: bool,
	pub nonce_draws: usize,
	pub sent: Vec<Bytes>,
	pub known: HashSet<B256>,
	pub receipts: HashMap<B256, LedgerReceipt>,
	/// Receipt lookups for these hashes fail with a node error.
	pub broken_receipts: HashSet<B256>,
	pub receipt_queries: usize,
}

/// In-memory ledger. Every call reads or records state under one lock.
pub struct MockLedger {
	pub state: Mutex<LedgerState>,
}

impl MockLedger {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(LedgerState {
				difficulty: U256::from(1000u64),
				target: U256::from(2u64).pow(U256::from(234u64)),
				reward: U256::from(50u64) * U256::from(10u64).pow(U256::from(8u64)),
				block: 100,
				gas_price: 10_000_000_000,
				estimate: 200_000,
				..Default::default()
			}),
		}
	}

	pub fn with<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
		f(&mut self.state.lock().unwrap())
	}

	pub fn set_receipt(&self, hash: B256, success: bool) {
		self.with(|s| {
			s.receipts.insert(
				hash,
				LedgerReceipt {
					tx_hash: hash,
					block_number: Some(s.block),
					status: ReceiptStatus::Encoded(if success { "0x1" } else { "0x0" }.into()),
				},
			);
		});
	}

	fn check_available(&self) -> Result<(), LedgerError> {
		if self.with(|s| s.unavailable) {
			return Err(LedgerError::Unavailable("connection refused".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl LedgerInterface for MockLedger {
	async fn mining_difficulty(&self) -> Result<U256, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| s.difficulty))
	}

	async fn mining_target(&self) -> Result<U256, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| s.target))
	}

	async fn challenge_number(&self) -> Result<B256, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| {
			if let Some(next) = s.challenges.pop_front() {
				s.challenge = next;
			}
			s.challenge
		}))
	}

	async fn mining_reward(&self) -> Result<U256, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| s.reward))
	}

	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| s.block))
	}

	async fn transaction_count(&self, _address: Address) -> Result<u64, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| {
			s.nonce_draws += 1;
			s.sent.len() as u64
		}))
	}

	async fn gas_price(&self) -> Result<u128, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| s.gas_price))
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
		self.check_available()?;
		self.with(|s| {
			let reverts = s
				.reverting_tokens
				.iter()
				.any(|token| call.data.windows(20).any(|w| w == token.as_slice()));
			if reverts {
				Err(LedgerError::Rejected("execution reverted".into()))
			} else {
				Ok(s.estimate)
			}
		})
	}

	async fn transaction(&self, hash: B256) -> Result<Option<LedgerTransaction>, LedgerError> {
		self.check_available()?;
		Ok(self.with(|s| {
			s.known.contains(&hash).then(|| LedgerTransaction {
				tx_hash: hash,
				block_number: None,
				nonce: 0,
			})
		}))
	}

	async fn transaction_receipt(&self, hash: B256) -> Result<Option<LedgerReceipt>, LedgerError> {
		self.check_available()?;
		self.with(|s| {
			s.receipt_queries += 1;
			if s.broken_receipts.contains(&hash) {
				return Err(LedgerError::Decode("invalid receipt".into()));
			}
			Ok(s.receipts.get(&hash).cloned())
		})
	}

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, LedgerError> {
		self.check_available()?;
		self.with(|s| {
			if s.reject_sends {
				return Err(LedgerError::Rejected("nonce too low".into()));
			}
			let hash = keccak256(raw);
			s.sent.push(raw.clone());
			s.known.insert(hash);
			Ok(hash)
		})
	}
}

/// Signs by hashing the transaction fields. The raw bytes are the preimage,
/// so the ledger mock derives the same hash from them.
pub struct MockAccount {
	address: Address,
}

impl MockAccount {
	pub fn new(address: Address) -> Self {
		Self { address }
	}
}

#[async_trait]
impl AccountInterface for MockAccount {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.address)
	}

	async fn sign_transaction(
		&self,
		tx: &RawTransaction,
	) -> Result<SignedTransaction, AccountError> {
		let mut preimage = Vec::new();
		preimage.extend_from_slice(self.address.as_slice());
		preimage.extend_from_slice(&tx.nonce.to_be_bytes());
		preimage.extend_from_slice(&tx.gas_limit.to_be_bytes());
		preimage.extend_from_slice(&tx.gas_price.to_be_bytes());
		preimage.extend_from_slice(tx.to.as_slice());
		preimage.extend_from_slice(&tx.data);
		let raw = Bytes::from(preimage);
		Ok(SignedTransaction {
			hash: keccak256(&raw),
			raw,
		})
	}
}

pub fn settings() -> CoordinatorSettings {
	CoordinatorSettings {
		token_contract: TOKEN,
		mint_helper: MINT_HELPER,
		..Default::default()
	}
}

pub fn context_with(ledger: Arc<MockLedger>, settings: CoordinatorSettings) -> Arc<CoordinatorContext> {
	let merge_mint = Arc::new(ProbingMergeMintResolver::new(
		ledger.clone(),
		settings.mint_helper,
		settings.merge_mint_candidates.clone(),
		settings.gas.ceiling,
	));
	Arc::new(CoordinatorContext {
		settings,
		storage: Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
		ledger,
		minting_account: Arc::new(AccountService::new(Box::new(MockAccount::new(
			MINTING_ADDRESS,
		)))),
		payment_account: Arc::new(AccountService::new(Box::new(MockAccount::new(
			PAYMENT_ADDRESS,
		)))),
		merge_mint,
	})
}

pub fn context(ledger: Arc<MockLedger>) -> Arc<CoordinatorContext> {
	context_with(ledger, settings())
}

pub fn challenge(byte: u8) -> B256 {
	B256::repeat_byte(byte)
}
