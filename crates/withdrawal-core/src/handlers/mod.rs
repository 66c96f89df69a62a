//! Job and request handlers.
//!
//! The processors run one broker delivery at a time against a stored entity
//! and own that entity's terminal-failure path. Intake creates the entities
//! and enqueues their jobs.

pub mod broadcast;
pub mod intake;
pub mod withdrawal;

pub use broadcast::BroadcastProcessor;
pub use intake::{IntakeHandler, RequestError};
pub use withdrawal::WithdrawalProcessor;

use crate::state::StateError;
use thiserror::Error;
use withdrawal_delivery::DeliveryError;
use withdrawal_types::AmountError;

/// Errors raised by a single processing attempt.
///
/// Every one of them is handed back to the broker, which decides whether the
/// job is retried.
#[derive(Debug, Error)]
pub enum ProcessingError {
	#[error("Chain error: {0}")]
	Chain(#[from] DeliveryError),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Amount conversion error: {0}")]
	Conversion(#[from] AmountError),
	#[error("State error: {0}")]
	State(String),
}

impl From<StateError> for ProcessingError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::Storage(msg) => ProcessingError::Storage(msg),
			other => ProcessingError::State(other.to_string()),
		}
	}
}
