//! Alloy-based EVM chain client.
//!
//! Talks to one JSON-RPC endpoint over HTTP. The provider carries a wallet
//! built from the active network's signing key, so every transaction it
//! sends is signed by the service.

use crate::{DeliveryError, DeliveryInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, FixedBytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use withdrawal_types::{
	ConfigSchema, FeeEstimate, Field, FieldType, ImplementationRegistry, NetworkConfig, Schema,
	TransactionHash, TransactionReceipt, ValidationError, WithdrawalCall,
};

sol! {
	interface ITreasury {
		function executeWithdrawal(address token, address to, uint256 amount, bytes bankSignature) external;
	}

	interface IERC20Metadata {
		function decimals() external view returns (uint8);
	}
}

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 7;

/// Alloy-based EVM delivery implementation.
pub struct AlloyDelivery {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	chain_id: u64,
	poll_interval: Duration,
	/// Upper bound for a confirmation wait. `None` waits indefinitely.
	confirmation_timeout: Option<Duration>,
}

impl AlloyDelivery {
	/// Creates a provider for `rpc_url` that signs with `signer` on `chain_id`.
	pub fn new(
		rpc_url: &str,
		chain_id: u64,
		signer: PrivateKeySigner,
		poll_interval: Duration,
		confirmation_timeout: Option<Duration>,
	) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		let wallet = EthereumWallet::from(signer.with_chain_id(Some(chain_id)));

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		provider.client().set_poll_interval(poll_interval);

		Ok(Self {
			provider: Arc::new(provider),
			chain_id,
			poll_interval,
			confirmation_timeout,
		})
	}

	async fn receipt(
		&self,
		hash: FixedBytes<32>,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
		}))
	}

	async fn poll_confirmations(
		&self,
		hash: FixedBytes<32>,
		confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		loop {
			let Some(receipt) = self.receipt(hash).await? else {
				tokio::time::sleep(self.poll_interval).await;
				continue;
			};

			let current_block = self.get_block_number().await?;
			// The inclusion block counts as the first confirmation
			let current_confirmations = current_block
				.saturating_sub(receipt.block_number)
				.saturating_add(1);

			if current_confirmations >= confirmations {
				return Ok(receipt);
			}

			tracing::debug!(
				"Waiting for {} more confirmations...",
				confirmations - current_confirmations
			);
			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

/// Configuration schema for the Alloy delivery implementation.
///
/// The RPC URL, chain id and signing key come from the active network, so
/// the implementation table only carries tuning knobs.
pub struct AlloyDeliverySchema;

impl ConfigSchema for AlloyDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"poll_interval_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new(
					"confirmation_timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyDeliverySchema)
	}

	async fn estimate_fees(&self) -> Result<FeeEstimate, DeliveryError> {
		let estimate = self
			.provider
			.estimate_eip1559_fees(None)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to estimate fees: {}", e)))?;

		Ok(FeeEstimate {
			max_fee_per_gas: estimate.max_fee_per_gas,
			max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
		})
	}

	async fn token_decimals(&self, token: Address) -> Result<u8, DeliveryError> {
		let call_data = IERC20Metadata::decimalsCall {}.abi_encode();

		let result = self
			.provider
			.call(&TransactionRequest::default().to(token).input(call_data.into()))
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to call decimals: {}", e)))?;

		let decoded = IERC20Metadata::decimalsCall::abi_decode_returns(&result, true)
			.map_err(|e| DeliveryError::Network(format!("Invalid decimals response: {}", e)))?;

		Ok(decoded._0)
	}

	async fn submit_withdrawal(
		&self,
		call: &WithdrawalCall,
		fees: FeeEstimate,
	) -> Result<TransactionHash, DeliveryError> {
		let call_data = ITreasury::executeWithdrawalCall {
			token: call.token,
			to: call.recipient,
			amount: call.amount,
			bankSignature: call.bank_signature.clone().into(),
		}
		.abi_encode();

		let request = TransactionRequest::default()
			.to(call.treasury)
			.input(call_data.into())
			.max_fee_per_gas(fees.max_fee_per_gas)
			.max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

		let pending_tx = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = TransactionHash(pending_tx.tx_hash().0.to_vec());
		tracing::info!(tx_hash = %tx_hash, chain_id = self.chain_id, "Submitted withdrawal");

		Ok(tx_hash)
	}

	async fn broadcast_raw(&self, raw_transaction: &[u8]) -> Result<TransactionHash, DeliveryError> {
		let pending_tx = self
			.provider
			.send_raw_transaction(raw_transaction)
			.await
			.map_err(|e| {
				DeliveryError::Network(format!("Failed to broadcast raw transaction: {}", e))
			})?;

		let tx_hash = TransactionHash(pending_tx.tx_hash().0.to_vec());
		tracing::info!(tx_hash = %tx_hash, chain_id = self.chain_id, "Broadcast raw transaction");

		Ok(tx_hash)
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		if hash.0.len() != 32 {
			return Err(DeliveryError::Network(format!(
				"Invalid transaction hash length: {}",
				hash.0.len()
			)));
		}
		let tx_hash = FixedBytes::<32>::from_slice(&hash.0);

		tracing::info!(
			tx_hash = %hash,
			"Waiting for {} confirmations",
			confirmations
		);

		match self.confirmation_timeout {
			Some(timeout) => tokio::time::timeout(timeout, self.poll_confirmations(tx_hash, confirmations))
				.await
				.map_err(|_| {
					DeliveryError::Network(format!(
						"Timeout waiting for {} confirmations after {} seconds",
						confirmations,
						timeout.as_secs()
					))
				})?,
			None => self.poll_confirmations(tx_hash, confirmations).await,
		}
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}
}

/// Factory function to create the Alloy chain client.
///
/// # Parameters
/// - `config`: the `[delivery.implementations.evm_alloy]` table:
///   - `poll_interval_seconds` (optional, default 7)
///   - `confirmation_timeout_seconds` (optional, default none)
/// - `network`: the active network, supplying RPC URL, chain id and signing key
pub fn create_http_delivery(
	config: &toml::Value,
	network: &NetworkConfig,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	AlloyDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(format!("Invalid configuration: {}", e)))?;

	let poll_interval = config
		.get("poll_interval_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);

	let confirmation_timeout = config
		.get("confirmation_timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| Duration::from_secs(v as u64));

	let signer: PrivateKeySigner = network.signer_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| DeliveryError::Configuration("Invalid signer key format".to_string()))
	})?;

	tracing::info!(
		chain_id = network.chain_id,
		signer = %signer.address(),
		"Initialized chain client"
	);

	let delivery = AlloyDelivery::new(
		&network.rpc_url,
		network.chain_id,
		signer,
		Duration::from_secs(poll_interval),
		confirmation_timeout,
	)?;

	Ok(Box::new(delivery))
}

/// Registry for the HTTP/Alloy delivery implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::DeliveryFactory;

	fn factory() -> Self::Factory {
		create_http_delivery
	}
}

impl crate::DeliveryRegistry for Registry {}
