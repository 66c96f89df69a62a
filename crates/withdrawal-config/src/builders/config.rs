//! Configuration builder for creating test and development configurations.
//!
//! The built configuration uses in-memory storage and queue backends, a log
//! alert sink and a local testnet, so it can drive the engine without any
//! external service.

use crate::{
	AlertConfig, ApiConfig, Config, DeliveryConfig, EngineConfig, NetworkSelection, QueueConfig,
	ServiceConfig, StorageConfig,
};
use std::collections::HashMap;
use withdrawal_types::{NetworkConfig, NetworkName, SecretString};

/// Well-known development key (anvil account 0).
const DEV_SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	chain_id: u64,
	rpc_url: String,
	confirmations: u64,
	engine: EngineConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-withdrawals".to_string(),
			chain_id: 31337,
			rpc_url: "http://localhost:8545".to_string(),
			confirmations: 1,
			engine: EngineConfig::default(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the chain ID of the testnet entry.
	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
		self.rpc_url = rpc_url.into();
		self
	}

	/// Sets the confirmations to wait for after broadcast.
	pub fn confirmations(mut self, confirmations: u64) -> Self {
		self.confirmations = confirmations;
		self
	}

	/// Toggles per-request serialization in the engine.
	pub fn exclusive_processing(mut self, exclusive: bool) -> Self {
		self.engine.exclusive_processing = exclusive;
		self
	}

	pub fn max_concurrent_jobs(mut self, max: usize) -> Self {
		self.engine.max_concurrent_jobs = max;
		self
	}

	pub fn poll_interval_ms(mut self, interval: u64) -> Self {
		self.engine.poll_interval_ms = interval;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let table = || toml::Value::Table(toml::map::Map::new());
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			network: NetworkSelection {
				active: NetworkName::Testnet,
				mainnet: None,
				testnet: Some(NetworkConfig {
					chain_id: self.chain_id,
					rpc_url: self.rpc_url,
					signer_key: SecretString::from(DEV_SIGNER_KEY),
				}),
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), table())]),
			},
			delivery: DeliveryConfig {
				primary: "evm_alloy".to_string(),
				implementations: HashMap::from([("evm_alloy".to_string(), table())]),
				confirmations: self.confirmations,
			},
			queue: QueueConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), table())]),
			},
			alert: AlertConfig {
				implementations: HashMap::from([("log".to_string(), table())]),
			},
			engine: self.engine,
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_built_config_is_valid() {
		let config = ConfigBuilder::new().confirmations(3).build();
		assert!(config.validate().is_ok());
		assert_eq!(config.delivery.confirmations, 3);
		assert_eq!(config.active_network().unwrap().chain_id, 31337);
	}
}
