//! Chain client for the withdrawal processor.
//!
//! This module defines the operations the processors need from an EVM
//! chain: fee estimation, token metadata, treasury withdrawal submission, raw
//! transaction relay and confirmation tracking. Implementations are built
//! once at startup from the active network's configuration.

use alloy_primitives::Address;
use async_trait::async_trait;
use thiserror::Error;
use withdrawal_types::{
	ConfigSchema, FeeEstimate, ImplementationRegistry, NetworkConfig, TransactionHash,
	TransactionReceipt, WithdrawalCall,
};

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a transaction was mined but reverted.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// Error that occurs when the implementation is misconfigured.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for chain clients.
///
/// All methods talk to the single network this process was configured for.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Returns the configuration schema for this delivery implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Reads the node's current EIP-1559 fee estimate.
	async fn estimate_fees(&self) -> Result<FeeEstimate, DeliveryError>;

	/// Reads a token's decimal precision through its ERC-20 `decimals()`.
	async fn token_decimals(&self, token: Address) -> Result<u8, DeliveryError>;

	/// Sends `executeWithdrawal` to the treasury with the given fee caps.
	///
	/// The outer transaction is signed with the service's key, completing the
	/// multi-sig together with the bank signature carried in the call.
	async fn submit_withdrawal(
		&self,
		call: &WithdrawalCall,
		fees: FeeEstimate,
	) -> Result<TransactionHash, DeliveryError>;

	/// Relays an already-signed raw transaction.
	async fn broadcast_raw(&self, raw_transaction: &[u8]) -> Result<TransactionHash, DeliveryError>;

	/// Waits until the transaction is mined and has `confirmations` blocks on
	/// top of and including its own.
	///
	/// Returns the receipt whether or not execution succeeded.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError>;

	/// Gets the current block number.
	async fn get_block_number(&self) -> Result<u64, DeliveryError>;
}

/// Type alias for delivery factory functions.
///
/// The factory receives the implementation's own table and the resolved
/// active network.
pub type DeliveryFactory =
	fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered delivery implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Service wrapping the configured chain client.
///
/// Applies the configured confirmation count and turns reverted receipts
/// into errors so callers only see successful confirmations.
pub struct DeliveryService {
	implementation: Box<dyn DeliveryInterface>,
	confirmations: u64,
}

impl DeliveryService {
	/// Creates a new DeliveryService. A confirmation count of 0 is raised to 1.
	pub fn new(implementation: Box<dyn DeliveryInterface>, confirmations: u64) -> Self {
		Self {
			implementation,
			confirmations: confirmations.max(1),
		}
	}

	pub fn confirmations(&self) -> u64 {
		self.confirmations
	}

	pub async fn estimate_fees(&self) -> Result<FeeEstimate, DeliveryError> {
		self.implementation.estimate_fees().await
	}

	pub async fn token_decimals(&self, token: Address) -> Result<u8, DeliveryError> {
		self.implementation.token_decimals(token).await
	}

	pub async fn submit_withdrawal(
		&self,
		call: &WithdrawalCall,
		fees: FeeEstimate,
	) -> Result<TransactionHash, DeliveryError> {
		self.implementation.submit_withdrawal(call, fees).await
	}

	pub async fn broadcast_raw(
		&self,
		raw_transaction: &[u8],
	) -> Result<TransactionHash, DeliveryError> {
		self.implementation.broadcast_raw(raw_transaction).await
	}

	/// Waits for the configured number of confirmations.
	///
	/// A mined but reverted transaction yields
	/// [`DeliveryError::TransactionFailed`].
	pub async fn confirm(&self, hash: &TransactionHash) -> Result<TransactionReceipt, DeliveryError> {
		let receipt = self
			.implementation
			.wait_for_confirmation(hash, self.confirmations)
			.await?;

		if !receipt.success {
			return Err(DeliveryError::TransactionFailed(format!(
				"Transaction {} reverted in block {}",
				hash, receipt.block_number
			)));
		}
		Ok(receipt)
	}

	pub async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		self.implementation.get_block_number().await
	}
}
