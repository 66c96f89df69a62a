//! Configuration for the withdrawal processor.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}`
//! placeholders are resolved from the environment before parsing, so signing
//! keys and RPC URLs never need to live in the file itself.

#[cfg(feature = "testing")]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use withdrawal_types::{NetworkConfig, NetworkName};

#[cfg(feature = "testing")]
pub use builders::config::ConfigBuilder;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Network selection and per-network connection parameters.
	pub network: NetworkSelection,
	/// Request store backends.
	pub storage: StorageConfig,
	/// Chain client backends.
	pub delivery: DeliveryConfig,
	/// Job broker backends.
	pub queue: QueueConfig,
	/// Alert sinks for terminal failures.
	pub alert: AlertConfig,
	/// Worker and dispatch loop settings.
	#[serde(default)]
	pub engine: EngineConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier, used in logs and health output.
	pub id: String,
}

/// Network selection.
///
/// Only the entry named by `active` is used. It is resolved once at startup
/// by [`Config::active_network`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSelection {
	/// Which network this process operates on.
	pub active: NetworkName,
	pub mainnet: Option<NetworkConfig>,
	pub testnet: Option<NetworkConfig>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the chain client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of delivery implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Confirmations to wait for after broadcast.
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
}

/// Returns the default number of confirmations.
///
/// One confirmation is the minimum the processors accept before marking a
/// withdrawal completed.
fn default_confirmations() -> u64 {
	1
}

/// Configuration for the job broker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of queue implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for alert sinks.
///
/// Every configured sink receives every alert.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertConfig {
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

/// Worker and dispatch loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Upper bound on jobs processed at the same time.
	#[serde(default = "default_max_concurrent_jobs")]
	pub max_concurrent_jobs: usize,
	/// How often the dispatch loop polls the broker, in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Serialize deliveries that reference the same stored request.
	#[serde(default = "default_exclusive_processing")]
	pub exclusive_processing: bool,
	/// How long shutdown waits for in-flight jobs, in seconds.
	#[serde(default = "default_shutdown_grace_seconds")]
	pub shutdown_grace_seconds: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_concurrent_jobs: default_max_concurrent_jobs(),
			poll_interval_ms: default_poll_interval_ms(),
			exclusive_processing: default_exclusive_processing(),
			shutdown_grace_seconds: default_shutdown_grace_seconds(),
		}
	}
}

fn default_max_concurrent_jobs() -> usize {
	16
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_exclusive_processing() -> bool {
	true
}

fn default_shutdown_grace_seconds() -> u64 {
	30
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: default_api_host(),
			port: default_api_port(),
			timeout_seconds: default_api_timeout(),
			max_request_size: default_max_request_size(),
		}
	}
}

/// Returns the default API host (localhost only).
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Returns the default maximum request size (1MB).
fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default`
/// for `${VAR_NAME:-default}` when the variable is unset.
///
/// Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads and validates configuration from a file.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read configuration file {}: {}", path, e),
			))
		})?;
		content.parse()
	}

	/// Returns the connection parameters of the active network.
	pub fn active_network(&self) -> Result<&NetworkConfig, ConfigError> {
		let network = match self.network.active {
			NetworkName::Mainnet => self.network.mainnet.as_ref(),
			NetworkName::Testnet => self.network.testnet.as_ref(),
		};
		network.ok_or_else(|| {
			ConfigError::Validation(format!(
				"Active network '{}' has no [network.{}] section",
				self.network.active, self.network.active
			))
		})
	}

	/// Validates the configuration.
	///
	/// Checks the service identity, the active network, every backend
	/// section's primary selection and the engine bounds. Backend-specific
	/// tables are validated by the backends themselves at construction.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		let network = self.active_network()?;
		if network.rpc_url.trim().is_empty() {
			return Err(ConfigError::Validation(format!(
				"Network '{}' rpc_url cannot be empty",
				self.network.active
			)));
		}
		if network.signer_key.is_empty() {
			return Err(ConfigError::Validation(format!(
				"Network '{}' signer_key cannot be empty",
				self.network.active
			)));
		}
		if network.chain_id == 0 {
			return Err(ConfigError::Validation(format!(
				"Network '{}' chain_id must be greater than 0",
				self.network.active
			)));
		}

		check_primary("storage", &self.storage.primary, &self.storage.implementations)?;

		check_primary("delivery", &self.delivery.primary, &self.delivery.implementations)?;
		if self.delivery.confirmations == 0 {
			return Err(ConfigError::Validation(
				"confirmations must be at least 1".into(),
			));
		}
		if self.delivery.confirmations > 100 {
			return Err(ConfigError::Validation(
				"confirmations cannot exceed 100".into(),
			));
		}

		check_primary("queue", &self.queue.primary, &self.queue.implementations)?;

		if self.alert.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one alert implementation must be configured".into(),
			));
		}

		if self.engine.max_concurrent_jobs == 0 || self.engine.max_concurrent_jobs > 1024 {
			return Err(ConfigError::Validation(
				"engine.max_concurrent_jobs must be between 1 and 1024".into(),
			));
		}
		if self.engine.poll_interval_ms < 10 {
			return Err(ConfigError::Validation(
				"engine.poll_interval_ms must be at least 10".into(),
			));
		}

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

/// Checks that a section names a primary implementation that is configured.
fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
