//! Processor for raw signed transaction relay.
//!
//! Same delivery rules as the withdrawal processor over a smaller graph:
//! PENDING -> BROADCASTED -> CONFIRMED, with PENDING -> FAILED on
//! exhaustion.

use super::ProcessingError;
use crate::state::{BroadcastStateMachine, StateError};
use alloy_primitives::hex;
use std::sync::Arc;
use tracing::instrument;
use withdrawal_alert::AlertService;
use withdrawal_delivery::DeliveryService;
use withdrawal_storage::{StorageError, StorageService};
use withdrawal_types::{
	current_timestamp, truncate_id, without_0x_prefix, FailureAlert, Job, RawBroadcastStatus,
	RawTransactionBroadcast, StorageKey, TransactionHash,
};

/// Processor for the `raw_broadcasts` queue.
pub struct BroadcastProcessor {
	storage: Arc<StorageService>,
	delivery: Arc<DeliveryService>,
	alerts: Arc<AlertService>,
	state_machine: Arc<BroadcastStateMachine>,
}

impl BroadcastProcessor {
	pub fn new(
		storage: Arc<StorageService>,
		delivery: Arc<DeliveryService>,
		alerts: Arc<AlertService>,
		state_machine: Arc<BroadcastStateMachine>,
	) -> Self {
		Self {
			storage,
			delivery,
			alerts,
			state_machine,
		}
	}

	/// Runs one delivery of a raw broadcast job.
	#[instrument(skip_all, fields(
		job_id = %truncate_id(&job.id),
		broadcast_id = %truncate_id(&job.payload.db_id),
		attempt = job.attempts_made + 1
	))]
	pub async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
		let id = job.payload.db_id.as_str();

		let Some(broadcast) = self.state_machine.get(id).await? else {
			tracing::warn!("Broadcast not found, nothing to do");
			return Ok(());
		};

		match broadcast.status {
			RawBroadcastStatus::Pending => {},
			RawBroadcastStatus::Broadcasted => return self.confirm(broadcast).await,
			RawBroadcastStatus::Confirmed | RawBroadcastStatus::Failed => {
				tracing::debug!(status = %broadcast.status, "Broadcast already terminal, skipping");
				return Ok(());
			},
		}

		let raw = hex::decode(without_0x_prefix(&broadcast.raw_transaction))
			.map_err(|e| ProcessingError::State(format!("Invalid raw transaction: {}", e)))?;

		let tx_hash = self.delivery.broadcast_raw(&raw).await?;
		tracing::info!(tx_hash = %truncate_id(&tx_hash.to_string()), "Raw transaction broadcasted");

		self.index_hash(id, &tx_hash).await?;
		let broadcast = self
			.state_machine
			.transition(id, RawBroadcastStatus::Broadcasted, |b| {
				b.tx_hash = Some(tx_hash.to_string())
			})
			.await?;

		self.confirm(broadcast).await
	}

	/// Claims `tx_hash` for broadcast `id` in the hash index.
	///
	/// Claiming a hash this broadcast already owns succeeds, so a delivery
	/// that failed after indexing can be repeated.
	async fn index_hash(&self, id: &str, tx_hash: &TransactionHash) -> Result<(), ProcessingError> {
		let namespace = StorageKey::BroadcastByTxHash.as_str();
		let key = tx_hash.to_string();

		match self.storage.create(namespace, &key, &id.to_string()).await {
			Ok(()) => Ok(()),
			Err(StorageError::AlreadyExists(_)) => {
				let owner: String = self
					.storage
					.retrieve(namespace, &key)
					.await
					.map_err(|e| ProcessingError::Storage(e.to_string()))?;
				if owner == id {
					Ok(())
				} else {
					Err(ProcessingError::State(format!(
						"Transaction {} is already tracked by broadcast {}",
						key, owner
					)))
				}
			},
			Err(e) => Err(ProcessingError::Storage(e.to_string())),
		}
	}

	async fn confirm(&self, broadcast: RawTransactionBroadcast) -> Result<(), ProcessingError> {
		let tx_hash = broadcast
			.tx_hash
			.as_deref()
			.ok_or_else(|| {
				ProcessingError::State(format!(
					"Broadcast {} is BROADCASTED without a transaction hash",
					broadcast.id
				))
			})
			.and_then(|hash| {
				TransactionHash::from_hex(hash).map_err(|e| {
					ProcessingError::State(format!("Invalid transaction hash {}: {}", hash, e))
				})
			})?;

		let receipt = self.delivery.confirm(&tx_hash).await?;
		self.state_machine
			.transition(&broadcast.id, RawBroadcastStatus::Confirmed, |_| {})
			.await?;

		tracing::info!(block = receipt.block_number, "Raw transaction confirmed");
		Ok(())
	}

	/// Handles a job that used up its retries.
	///
	/// PENDING becomes FAILED. A BROADCASTED row keeps its status and only
	/// gets the error recorded. The alert is always sent.
	#[instrument(skip_all, fields(
		job_id = %truncate_id(&job.id),
		broadcast_id = %truncate_id(&job.payload.db_id),
		attempts = attempts
	))]
	pub async fn handle_exhausted(
		&self,
		job: &Job,
		attempts: u32,
		error: &str,
	) -> Result<(), ProcessingError> {
		let recorded = self
			.state_machine
			.update_with(&job.payload.db_id, |broadcast| {
				match broadcast.status {
					RawBroadcastStatus::Pending => broadcast.status = RawBroadcastStatus::Failed,
					RawBroadcastStatus::Broadcasted => {},
					_ => return Ok(broadcast.status),
				}
				broadcast.error_message = Some(error.to_string());
				broadcast.updated_at = current_timestamp();
				Ok(broadcast.status)
			})
			.await;

		let recorded = match recorded {
			Ok(status) => {
				tracing::error!(status = %status, error = %error, "Broadcast retries exhausted");
				Ok(())
			},
			Err(StateError::NotFound) => {
				tracing::warn!(error = %error, "Broadcast retries exhausted for a missing request");
				Ok(())
			},
			Err(e) => Err(ProcessingError::from(e)),
		};

		self.alerts
			.notify(&FailureAlert {
				queue: job.queue,
				job_id: job.id.clone(),
				db_id: job.payload.db_id.clone(),
				attempts,
				error: error.to_string(),
				occurred_at: current_timestamp(),
			})
			.await;

		recorded
	}
}
