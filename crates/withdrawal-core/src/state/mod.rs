//! State management for withdrawals and raw broadcasts.
//!
//! Each entity has a state machine backed by a static transition table. Every
//! status change is validated against the table and persisted through the
//! storage service's atomic read-then-write, so a check and the write it
//! guards can never interleave with another writer.

pub mod broadcast;
pub mod withdrawal;

pub use broadcast::BroadcastStateMachine;
pub use withdrawal::WithdrawalStateMachine;

use thiserror::Error;
use withdrawal_storage::StorageError;

/// Errors that can occur during state management.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: String, to: String },
	#[error("Record not found")]
	NotFound,
}

impl From<StorageError> for StateError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => StateError::NotFound,
			other => StateError::Storage(other.to_string()),
		}
	}
}
