//! Hand-written chain and alert doubles for the engine tests.

use crate::WithdrawalEngine;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use withdrawal_alert::{AlertError, AlertInterface, AlertService};
use withdrawal_config::ConfigBuilder;
use withdrawal_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use withdrawal_queue::implementations::memory::MemoryQueue;
use withdrawal_queue::QueueService;
use withdrawal_storage::implementations::memory::MemoryStorage;
use withdrawal_storage::StorageService;
use withdrawal_types::{
	ConfigSchema, FailureAlert, FeeEstimate, NewRawBroadcast, NewWithdrawal, Schema,
	TransactionHash, TransactionReceipt, ValidationError, WithdrawalCall,
};

pub(crate) const TREASURY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub(crate) const DESTINATION: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub(crate) const TOKEN: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Counters and injected failures shared between a test and its chain double.
#[derive(Default)]
pub(crate) struct ChainState {
	/// Number of upcoming submissions that fail.
	pub submit_failures: AtomicU32,
	/// Number of upcoming raw broadcasts that fail.
	pub broadcast_failures: AtomicU32,
	/// Number of upcoming confirmation waits that fail.
	pub confirm_failures: AtomicU32,
	/// Receipts report a revert when set.
	pub reverted: AtomicBool,
	/// Milliseconds each confirmation wait takes.
	pub confirm_delay_ms: AtomicU64,
	/// Submissions panic when set.
	pub panic_on_submit: AtomicBool,
	/// Every raw broadcast returns the same hash when set.
	pub fixed_broadcast_hash: AtomicBool,
	pub submits: AtomicU32,
	pub broadcasts: AtomicU32,
	pub fee_reads: AtomicU32,
	pub confirm_calls: AtomicU32,
	/// Scaled amounts of every submitted withdrawal.
	pub amounts: Mutex<Vec<U256>>,
}

fn take_failure(counter: &AtomicU32) -> bool {
	counter
		.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
		.is_ok()
}

/// Chain double with a 6-decimals token.
#[derive(Clone, Default)]
pub(crate) struct MockChain {
	pub state: Arc<ChainState>,
}

impl MockChain {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn failing_submits(self, n: u32) -> Self {
		self.state.submit_failures.store(n, Ordering::SeqCst);
		self
	}

	pub fn failing_broadcasts(self, n: u32) -> Self {
		self.state.broadcast_failures.store(n, Ordering::SeqCst);
		self
	}

	pub fn failing_confirmations(self, n: u32) -> Self {
		self.state.confirm_failures.store(n, Ordering::SeqCst);
		self
	}

	pub fn same_broadcast_hash(self) -> Self {
		self.state.fixed_broadcast_hash.store(true, Ordering::SeqCst);
		self
	}

	pub fn submits(&self) -> u32 {
		self.state.submits.load(Ordering::SeqCst)
	}

	pub fn broadcasts(&self) -> u32 {
		self.state.broadcasts.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl DeliveryInterface for MockChain {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn estimate_fees(&self) -> Result<FeeEstimate, DeliveryError> {
		let reads = self.state.fee_reads.fetch_add(1, Ordering::SeqCst) as u128;
		Ok(FeeEstimate {
			max_fee_per_gas: 30_000_000_000 + reads,
			max_priority_fee_per_gas: 1_000_000_000,
		})
	}

	async fn token_decimals(&self, _token: Address) -> Result<u8, DeliveryError> {
		Ok(6)
	}

	async fn submit_withdrawal(
		&self,
		call: &WithdrawalCall,
		_fees: FeeEstimate,
	) -> Result<TransactionHash, DeliveryError> {
		if self.state.panic_on_submit.load(Ordering::SeqCst) {
			panic!("signer unavailable");
		}
		if take_failure(&self.state.submit_failures) {
			return Err(DeliveryError::Network("connection refused".to_string()));
		}
		let n = self.state.submits.fetch_add(1, Ordering::SeqCst) + 1;
		self.state.amounts.lock().unwrap().push(call.amount);
		Ok(TransactionHash(vec![n as u8; 32]))
	}

	async fn broadcast_raw(&self, _raw: &[u8]) -> Result<TransactionHash, DeliveryError> {
		if take_failure(&self.state.broadcast_failures) {
			return Err(DeliveryError::Network("nonce too low".to_string()));
		}
		let n = self.state.broadcasts.fetch_add(1, Ordering::SeqCst) + 1;
		if self.state.fixed_broadcast_hash.load(Ordering::SeqCst) {
			return Ok(TransactionHash(vec![0xaa; 32]));
		}
		Ok(TransactionHash(vec![0x80 | n as u8; 32]))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		_confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		self.state.confirm_calls.fetch_add(1, Ordering::SeqCst);
		let delay = self.state.confirm_delay_ms.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}
		if take_failure(&self.state.confirm_failures) {
			return Err(DeliveryError::Network("receipt poll timed out".to_string()));
		}
		Ok(TransactionReceipt {
			hash: hash.clone(),
			block_number: 100,
			success: !self.state.reverted.load(Ordering::SeqCst),
		})
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		Ok(100)
	}
}

/// Alert sink that keeps every alert it receives.
#[derive(Clone, Default)]
pub(crate) struct RecordingAlert {
	pub alerts: Arc<Mutex<Vec<FailureAlert>>>,
	/// Seconds each delivery takes before it is recorded.
	pub delay_secs: Arc<AtomicU64>,
}

impl RecordingAlert {
	pub fn received(&self) -> Vec<FailureAlert> {
		self.alerts.lock().unwrap().clone()
	}
}

#[async_trait]
impl AlertInterface for RecordingAlert {
	async fn send(&self, alert: &FailureAlert) -> Result<(), AlertError> {
		let delay = self.delay_secs.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_secs(delay)).await;
		}
		self.alerts.lock().unwrap().push(alert.clone());
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}
}

/// Builds an engine over memory backends and the given chain double.
pub(crate) fn test_engine(chain: &MockChain, exclusive: bool) -> (WithdrawalEngine, RecordingAlert) {
	let config = ConfigBuilder::new()
		.exclusive_processing(exclusive)
		.poll_interval_ms(10)
		.build();
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	let delivery = Arc::new(DeliveryService::new(Box::new(chain.clone()), 1));
	let queue = Arc::new(QueueService::new(Box::new(MemoryQueue::new())));
	let recorder = RecordingAlert::default();
	let alerts = Arc::new(AlertService::new(vec![(
		"recording".to_string(),
		Box::new(recorder.clone()) as Box<dyn AlertInterface>,
	)]));

	(
		WithdrawalEngine::new(config, storage, delivery, queue, alerts),
		recorder,
	)
}

pub(crate) fn new_withdrawal(request_id: &str, amount: &str) -> NewWithdrawal {
	NewWithdrawal {
		request_id: request_id.to_string(),
		treasury_address: TREASURY.to_string(),
		destination_address: DESTINATION.to_string(),
		token_address: TOKEN.to_string(),
		amount: amount.to_string(),
		signed_payload: "0xdeadbeef".to_string(),
	}
}

pub(crate) fn new_broadcast() -> NewRawBroadcast {
	NewRawBroadcast {
		client_id: Some("client-1".to_string()),
		raw_transaction: "0x02f86b0180843b9aca00".to_string(),
	}
}
