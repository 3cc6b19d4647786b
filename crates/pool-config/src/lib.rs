//! Configuration loading for the pool coordinator.
//!
//! A TOML file is read, `${VAR}` references are substituted from the
//! environment, prefixed environment overrides are applied and the result
//! is validated before anything else starts.

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "POOL_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<PoolConfig, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		let mut config = self.load_from_file(file_path).await?;
		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<PoolConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted_content = substitute_env_vars(&content)?;

		toml::from_str(&substituted_content).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn var(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut PoolConfig) -> Result<(), ConfigError> {
		if let Some(rpc_url) = self.var("RPC_URL") {
			debug!("Overriding RPC URL from environment");
			config.ledger.rpc_url = rpc_url;
		}

		if let Some(redis_url) = self.var("REDIS_URL") {
			debug!("Overriding redis URL from environment");
			config.storage.redis_url = redis_url;
		}

		if let Some(replicas) = self.var("REPLICAS") {
			config.pool.replicas = replicas
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid replicas: {}", e)))?;
		}

		if let Some(instance_id) = self.var("INSTANCE_ID") {
			config.pool.instance_id = Some(instance_id);
		}

		if let Some(key) = self.var("MINTING_KEY") {
			debug!("Overriding minting key from environment");
			config.accounts.minting.private_key = key;
		}

		if let Some(key) = self.var("PAYMENT_KEY") {
			debug!("Overriding payment key from environment");
			config.accounts.payment.private_key = key;
		}

		if let Some(log_level) = self.var("LOG_LEVEL") {
			config.pool.log_level = log_level;
		}

		Ok(())
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut result = content.to_string();

	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

/// Checks cross-field constraints serde cannot express.
pub fn validate_config(config: &PoolConfig) -> Result<(), ConfigError> {
	let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

	if config.pool.replicas == 0 {
		return invalid("pool.replicas must be at least 1".to_string());
	}

	let url = &config.ledger.rpc_url;
	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return invalid("ledger.rpc_url must start with http:// or https://".to_string());
	}

	if config.ledger.chain_id == 0 {
		return invalid("ledger.chain_id must be at least 1".to_string());
	}

	for (name, account) in [
		("minting", &config.accounts.minting),
		("payment", &config.accounts.payment),
	] {
		pool_account::validate_private_key(&account.private_key)
			.map_err(|e| ConfigError::ValidationError(format!("accounts.{}: {}", name, e)))?;
	}

	if config.storage.backend == StorageBackend::Redis
		&& !config.storage.redis_url.starts_with("redis")
	{
		return invalid("storage.redis_url must be a redis:// or rediss:// URL".to_string());
	}

	let gas = &config.gas;
	if gas.solution_floor > gas.ceiling {
		return invalid(format!(
			"gas.solution_floor ({}) exceeds gas.ceiling ({})",
			gas.solution_floor, gas.ceiling
		));
	}
	if gas.estimate_multiplier < 1.0 || gas.solution_gas_price_multiplier < 1.0 {
		return invalid("gas multipliers must be at least 1.0".to_string());
	}

	let coordinator = &config.coordinator;
	if coordinator.lost_block_threshold == 0 {
		return invalid("coordinator.lost_block_threshold must be at least 1".to_string());
	}
	if coordinator.max_broadcast_attempts == 0 {
		return invalid("coordinator.max_broadcast_attempts must be at least 1".to_string());
	}
	if coordinator.retry_backoff_ms > coordinator.retry_backoff_max_ms {
		return invalid("coordinator.retry_backoff_ms exceeds retry_backoff_max_ms".to_string());
	}
	// Live workers heartbeat once per broadcast tick.
	if coordinator.lease_timeout_ms <= 2 * coordinator.broadcast_interval_ms {
		return invalid(
			"coordinator.lease_timeout_ms must exceed twice broadcast_interval_ms".to_string(),
		);
	}

	if let Some(instance_id) = &config.pool.instance_id {
		if instance_id.is_empty() {
			return invalid("pool.instance_id must not be empty".to_string());
		}
	}

	Ok(())
}
