//! Intake, cancellation and read operations.
//!
//! Intake validates a submission, persists it with its uniqueness index and
//! enqueues the job that will process it. Cancellation and status changes go
//! through the same atomic read-then-write as the processors.

use crate::state::{StateError, WithdrawalStateMachine};
use alloy_primitives::{hex, Address};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use withdrawal_queue::{QueueError, QueueService};
use withdrawal_storage::{StorageError, StorageService};
use withdrawal_types::{
	current_timestamp, parse_token_amount, truncate_id, without_0x_prefix, JobPayload,
	NewRawBroadcast, NewWithdrawal, QueueName, RawBroadcastStatus, RawTransactionBroadcast,
	StorageKey, WithdrawalFilter, WithdrawalRequest, WithdrawalStatus,
};

const MAX_REQUEST_ID_LEN: usize = 128;
const MAX_CLIENT_ID_LEN: usize = 128;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Errors returned to callers of the request operations.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Duplicate request: {0}")]
	Duplicate(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Infrastructure error: {0}")]
	Infrastructure(String),
}

impl From<StorageError> for RequestError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => RequestError::NotFound("Record not found".to_string()),
			other => RequestError::Infrastructure(other.to_string()),
		}
	}
}

impl From<QueueError> for RequestError {
	fn from(err: QueueError) -> Self {
		RequestError::Infrastructure(err.to_string())
	}
}

impl From<StateError> for RequestError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::NotFound => RequestError::NotFound("Record not found".to_string()),
			StateError::InvalidTransition { from, to } => RequestError::Conflict(format!(
				"Invalid state transition from {} to {}",
				from, to
			)),
			StateError::Storage(msg) => RequestError::Infrastructure(msg),
		}
	}
}

/// Handler behind the HTTP request operations.
pub struct IntakeHandler {
	storage: Arc<StorageService>,
	queue: Arc<QueueService>,
	state_machine: Arc<WithdrawalStateMachine>,
}

impl IntakeHandler {
	pub fn new(
		storage: Arc<StorageService>,
		queue: Arc<QueueService>,
		state_machine: Arc<WithdrawalStateMachine>,
	) -> Self {
		Self {
			storage,
			queue,
			state_machine,
		}
	}

	/// Accepts a new withdrawal and enqueues it for processing.
	///
	/// The external request id is claimed through a create-if-absent index
	/// entry before the row is written, so two concurrent submissions of the
	/// same id cannot both succeed.
	pub async fn submit_withdrawal(
		&self,
		new: NewWithdrawal,
	) -> Result<WithdrawalRequest, RequestError> {
		let request_id = new.request_id.trim().to_string();
		validate_request_id(&request_id)?;
		let treasury_address = parse_address("treasuryAddress", &new.treasury_address)?;
		let destination_address = parse_address("destinationAddress", &new.destination_address)?;
		let token_address = parse_address("tokenAddress", &new.token_address)?;
		let amount = validate_amount(&new.amount)?;
		validate_hex("signedPayload", &new.signed_payload)?;

		let id = uuid::Uuid::new_v4().to_string();
		match self
			.storage
			.create(StorageKey::WithdrawalByRequestId.as_str(), &request_id, &id)
			.await
		{
			Ok(()) => {},
			Err(StorageError::AlreadyExists(_)) => {
				return Err(RequestError::Duplicate(format!(
					"Withdrawal with request id '{}' already exists",
					request_id
				)))
			},
			Err(e) => return Err(e.into()),
		}

		let now = current_timestamp();
		let mut request = WithdrawalRequest {
			id: id.clone(),
			request_id,
			status: WithdrawalStatus::PendingSignature,
			treasury_address,
			destination_address,
			token_address,
			amount,
			signed_payload: new.signed_payload.trim().to_string(),
			tx_hash: None,
			error_message: None,
			created_at: now,
			updated_at: now,
			history: Vec::new(),
		};
		request.record_transition(WithdrawalStatus::PendingSignature, None, now);

		self.storage
			.create(StorageKey::Withdrawals.as_str(), &id, &request)
			.await?;

		let job = self
			.queue
			.enqueue(QueueName::Withdrawals, JobPayload::new(id.clone()))
			.await
			.inspect_err(|e| {
				tracing::error!(
					withdrawal_id = %truncate_id(&id),
					error = %e,
					"Withdrawal stored but could not be enqueued"
				)
			})?;

		tracing::info!(
			withdrawal_id = %truncate_id(&id),
			request_id = %request.request_id,
			job_id = %truncate_id(&job.id),
			"Withdrawal accepted"
		);
		Ok(request)
	}

	/// Cancels a withdrawal that has not started processing.
	///
	/// Any status other than PENDING_SIGNATURE is a conflict, and the row is
	/// left untouched.
	pub async fn cancel_withdrawal(&self, id: &str) -> Result<WithdrawalRequest, RequestError> {
		let result = self
			.state_machine
			.update_with(id, |request| {
				if request.status != WithdrawalStatus::PendingSignature {
					return Err(StateError::InvalidTransition {
						from: request.status.to_string(),
						to: WithdrawalStatus::Cancelled.to_string(),
					});
				}
				WithdrawalStateMachine::apply(
					request,
					WithdrawalStatus::Cancelled,
					Some("cancelled by request".to_string()),
				)?;
				Ok(request.clone())
			})
			.await;

		match result {
			Ok(request) => {
				tracing::info!(withdrawal_id = %truncate_id(id), "Withdrawal cancelled");
				Ok(request)
			},
			Err(StateError::NotFound) => Err(RequestError::NotFound(format!(
				"Withdrawal {} not found",
				id
			))),
			Err(StateError::InvalidTransition { from, .. }) => Err(RequestError::Conflict(format!(
				"Withdrawal {} cannot be cancelled in status {}",
				id, from
			))),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn get_withdrawal(&self, id: &str) -> Result<WithdrawalRequest, RequestError> {
		self.state_machine
			.get(id)
			.await?
			.ok_or_else(|| RequestError::NotFound(format!("Withdrawal {} not found", id)))
	}

	/// Lists withdrawals, newest first.
	pub async fn list_withdrawals(
		&self,
		filter: &WithdrawalFilter,
	) -> Result<Vec<WithdrawalRequest>, RequestError> {
		let mut requests: Vec<WithdrawalRequest> = self
			.storage
			.list(StorageKey::Withdrawals.as_str())
			.await?;

		if let Some(status) = filter.status {
			requests.retain(|r| r.status == status);
		}
		requests.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| b.id.cmp(&a.id))
		});

		let limit = filter
			.limit
			.unwrap_or(DEFAULT_LIST_LIMIT)
			.min(MAX_LIST_LIMIT);
		Ok(requests
			.into_iter()
			.skip(filter.offset.unwrap_or(0))
			.take(limit)
			.collect())
	}

	/// Accepts an already-signed transaction for relay.
	pub async fn submit_raw_broadcast(
		&self,
		new: NewRawBroadcast,
	) -> Result<RawTransactionBroadcast, RequestError> {
		validate_hex("rawTransaction", &new.raw_transaction)?;
		let client_id = new
			.client_id
			.map(|c| c.trim().to_string())
			.filter(|c| !c.is_empty());
		if client_id
			.as_ref()
			.is_some_and(|c| c.len() > MAX_CLIENT_ID_LEN)
		{
			return Err(RequestError::Validation(format!(
				"clientId must be at most {} characters",
				MAX_CLIENT_ID_LEN
			)));
		}

		let now = current_timestamp();
		let broadcast = RawTransactionBroadcast {
			id: uuid::Uuid::new_v4().to_string(),
			client_id,
			raw_transaction: new.raw_transaction.trim().to_string(),
			status: RawBroadcastStatus::Pending,
			tx_hash: None,
			error_message: None,
			created_at: now,
			updated_at: now,
		};

		self.storage
			.create(StorageKey::Broadcasts.as_str(), &broadcast.id, &broadcast)
			.await?;
		let job = self
			.queue
			.enqueue(QueueName::RawBroadcasts, JobPayload::new(broadcast.id.clone()))
			.await?;

		tracing::info!(
			broadcast_id = %truncate_id(&broadcast.id),
			job_id = %truncate_id(&job.id),
			"Raw broadcast accepted"
		);
		Ok(broadcast)
	}

	pub async fn get_raw_broadcast(&self, id: &str) -> Result<RawTransactionBroadcast, RequestError> {
		self.storage
			.find(StorageKey::Broadcasts.as_str(), id)
			.await?
			.ok_or_else(|| RequestError::NotFound(format!("Broadcast {} not found", id)))
	}
}

fn validate_request_id(request_id: &str) -> Result<(), RequestError> {
	if request_id.is_empty() {
		return Err(RequestError::Validation("requestId is required".to_string()));
	}
	if request_id.chars().count() > MAX_REQUEST_ID_LEN {
		return Err(RequestError::Validation(format!(
			"requestId must be at most {} characters",
			MAX_REQUEST_ID_LEN
		)));
	}
	Ok(())
}

fn parse_address(field: &str, value: &str) -> Result<Address, RequestError> {
	let value = value.trim();
	let digits = without_0x_prefix(value);
	if digits.len() != 40 {
		return Err(RequestError::Validation(format!(
			"{} must be a 20-byte hex address",
			field
		)));
	}
	Address::from_str(value)
		.map_err(|e| RequestError::Validation(format!("{} is not a valid address: {}", field, e)))
}

/// Checks that `amount` is a positive plain decimal and returns it trimmed.
fn validate_amount(amount: &str) -> Result<String, RequestError> {
	let amount = amount.trim();
	let fraction_digits = amount
		.split_once('.')
		.map(|(_, fraction)| fraction.len())
		.unwrap_or(0);
	let decimals = u8::try_from(fraction_digits)
		.map_err(|_| RequestError::Validation("amount has too many decimal places".to_string()))?;

	let scaled = parse_token_amount(amount, decimals)
		.map_err(|e| RequestError::Validation(format!("amount is invalid: {}", e)))?;
	if scaled.is_zero() {
		return Err(RequestError::Validation("amount must be positive".to_string()));
	}
	Ok(amount.to_string())
}

fn validate_hex(field: &str, value: &str) -> Result<(), RequestError> {
	let digits = without_0x_prefix(value.trim());
	if digits.is_empty() {
		return Err(RequestError::Validation(format!("{} is required", field)));
	}
	hex::decode(digits)
		.map(|_| ())
		.map_err(|e| RequestError::Validation(format!("{} is not valid hex: {}", field, e)))
}
