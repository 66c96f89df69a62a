//! Transaction processor for multi-sig withdrawals.
//!
//! Each delivery of a `withdrawals` job drives one request as far as it can:
//! PROCESSING, then submission to the treasury, BROADCASTED with the hash,
//! and COMPLETED once confirmed. Deliveries are safe to repeat. Terminal rows
//! are left alone, and a BROADCASTED row resumes at the confirmation wait
//! instead of submitting again.

use super::ProcessingError;
use crate::state::{StateError, WithdrawalStateMachine};
use alloy_primitives::hex;
use std::sync::Arc;
use tracing::instrument;
use withdrawal_alert::AlertService;
use withdrawal_delivery::DeliveryService;
use withdrawal_types::{
	current_timestamp, format_token_amount, parse_token_amount, truncate_id, without_0x_prefix,
	FailureAlert, Job, TransactionHash, WithdrawalCall, WithdrawalRequest, WithdrawalStatus,
};

/// Processor for the `withdrawals` queue.
pub struct WithdrawalProcessor {
	delivery: Arc<DeliveryService>,
	alerts: Arc<AlertService>,
	state_machine: Arc<WithdrawalStateMachine>,
}

impl WithdrawalProcessor {
	pub fn new(
		delivery: Arc<DeliveryService>,
		alerts: Arc<AlertService>,
		state_machine: Arc<WithdrawalStateMachine>,
	) -> Self {
		Self {
			delivery,
			alerts,
			state_machine,
		}
	}

	/// Runs one delivery of a withdrawal job.
	///
	/// Errors are returned unchanged so the broker can retry.
	#[instrument(skip_all, fields(
		job_id = %truncate_id(&job.id),
		withdrawal_id = %truncate_id(&job.payload.db_id),
		attempt = job.attempts_made + 1
	))]
	pub async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
		let id = job.payload.db_id.as_str();

		let Some(request) = self.state_machine.get(id).await? else {
			tracing::warn!("Withdrawal not found, nothing to do");
			return Ok(());
		};

		let request = match request.status {
			WithdrawalStatus::Completed | WithdrawalStatus::Cancelled | WithdrawalStatus::Failed => {
				tracing::debug!(status = %request.status, "Withdrawal already terminal, skipping");
				return Ok(());
			},
			WithdrawalStatus::Broadcasted => return self.confirm(request).await,
			WithdrawalStatus::Processing => request,
			WithdrawalStatus::PendingSignature => match self.start(id).await? {
				Some(request) => request,
				None => return Ok(()),
			},
		};

		let decimals = self.delivery.token_decimals(request.token_address).await?;
		let amount = parse_token_amount(&request.amount, decimals)?;
		let bank_signature = hex::decode(without_0x_prefix(&request.signed_payload))
			.map_err(|e| ProcessingError::State(format!("Invalid signed payload: {}", e)))?;

		let call = WithdrawalCall {
			treasury: request.treasury_address,
			token: request.token_address,
			recipient: request.destination_address,
			amount,
			bank_signature,
		};

		// Fees are read per attempt so a retry never reuses a stale estimate.
		let fees = self.delivery.estimate_fees().await?;
		tracing::info!(
			amount = %format_token_amount(&amount.to_string(), decimals),
			units = %amount,
			decimals,
			max_fee_per_gas = fees.max_fee_per_gas,
			max_priority_fee_per_gas = fees.max_priority_fee_per_gas,
			"Submitting withdrawal"
		);

		let tx_hash = self.delivery.submit_withdrawal(&call, fees).await?;
		tracing::info!(tx_hash = %truncate_id(&tx_hash.to_string()), "Withdrawal broadcasted");

		let request = self
			.state_machine
			.transition(
				id,
				WithdrawalStatus::Broadcasted,
				Some(format!("tx {}", tx_hash)),
				|r| r.tx_hash = Some(tx_hash.to_string()),
			)
			.await?;

		self.confirm(request).await
	}

	/// Moves a PENDING_SIGNATURE request to PROCESSING.
	///
	/// Returns `None` if the request left PENDING_SIGNATURE for anything but
	/// PROCESSING since it was read, which only a cancel can do.
	async fn start(&self, id: &str) -> Result<Option<WithdrawalRequest>, ProcessingError> {
		let started = self
			.state_machine
			.update_with(id, |request| match request.status {
				WithdrawalStatus::PendingSignature => {
					WithdrawalStateMachine::apply(request, WithdrawalStatus::Processing, None)?;
					request.error_message = None;
					Ok(Some(request.clone()))
				},
				WithdrawalStatus::Processing => Ok(Some(request.clone())),
				_ => Ok(None),
			})
			.await?;

		match &started {
			Some(_) => tracing::info!("Withdrawal processing started"),
			None => tracing::info!("Withdrawal left PENDING_SIGNATURE before processing, skipping"),
		}
		Ok(started)
	}

	/// Waits for the recorded transaction and completes the request.
	async fn confirm(&self, request: WithdrawalRequest) -> Result<(), ProcessingError> {
		let tx_hash = request
			.tx_hash
			.as_deref()
			.ok_or_else(|| {
				ProcessingError::State(format!(
					"Withdrawal {} is BROADCASTED without a transaction hash",
					request.id
				))
			})
			.and_then(|hash| {
				TransactionHash::from_hex(hash).map_err(|e| {
					ProcessingError::State(format!("Invalid transaction hash {}: {}", hash, e))
				})
			})?;

		let receipt = self.delivery.confirm(&tx_hash).await?;

		self.state_machine
			.transition(
				&request.id,
				WithdrawalStatus::Completed,
				Some(format!("confirmed in block {}", receipt.block_number)),
				|_| {},
			)
			.await?;

		tracing::info!(block = receipt.block_number, "Withdrawal completed");
		Ok(())
	}

	/// Handles a job that used up its retries.
	///
	/// A PROCESSING request becomes FAILED. A request that cannot legally
	/// fail, such as one already BROADCASTED, only gets the error recorded.
	/// The alert is sent in every case, even when the write fails.
	#[instrument(skip_all, fields(
		job_id = %truncate_id(&job.id),
		withdrawal_id = %truncate_id(&job.payload.db_id),
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
			.update_with(&job.payload.db_id, |request| {
				match request.status {
					WithdrawalStatus::Processing => {
						WithdrawalStateMachine::apply(
							request,
							WithdrawalStatus::Failed,
							Some(error.to_string()),
						)?;
					},
					WithdrawalStatus::PendingSignature | WithdrawalStatus::Broadcasted => {
						request.updated_at = current_timestamp();
					},
					// Terminal rows are never touched again.
					_ => return Ok(request.status),
				}
				request.error_message = Some(error.to_string());
				Ok(request.status)
			})
			.await;

		let recorded = match recorded {
			Ok(status) => {
				tracing::error!(status = %status, error = %error, "Withdrawal retries exhausted");
				Ok(())
			},
			Err(StateError::NotFound) => {
				tracing::warn!(error = %error, "Withdrawal retries exhausted for a missing request");
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
