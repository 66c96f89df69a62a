//! Raw broadcast state machine.
//!
//! Raw broadcasts move PENDING -> BROADCASTED -> CONFIRMED, or PENDING ->
//! FAILED once retries are exhausted.

use super::StateError;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use withdrawal_storage::StorageService;
use withdrawal_types::{current_timestamp, RawBroadcastStatus, RawTransactionBroadcast, StorageKey};

/// Manages raw broadcast state transitions and persistence.
pub struct BroadcastStateMachine {
	storage: Arc<StorageService>,
}

impl BroadcastStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub fn is_valid_transition(from: RawBroadcastStatus, to: RawBroadcastStatus) -> bool {
		static TRANSITIONS: Lazy<HashMap<RawBroadcastStatus, HashSet<RawBroadcastStatus>>> =
			Lazy::new(|| {
				use withdrawal_types::RawBroadcastStatus::*;

				let mut m = HashMap::new();
				m.insert(Pending, HashSet::from([Broadcasted, Failed]));
				m.insert(Broadcasted, HashSet::from([Confirmed]));
				m.insert(Confirmed, HashSet::new());
				m.insert(Failed, HashSet::new());
				m
			});

		TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	pub async fn get(&self, id: &str) -> Result<Option<RawTransactionBroadcast>, StateError> {
		Ok(self
			.storage
			.find(StorageKey::Broadcasts.as_str(), id)
			.await?)
	}

	/// Runs `updater` against the stored broadcast under the key's write lock.
	pub async fn update_with<R, F>(&self, id: &str, updater: F) -> Result<R, StateError>
	where
		F: FnOnce(&mut RawTransactionBroadcast) -> Result<R, StateError>,
	{
		self.storage
			.update_with(StorageKey::Broadcasts.as_str(), id, updater)
			.await
	}

	/// Transitions a broadcast to a new status with validation.
	pub async fn transition<F>(
		&self,
		id: &str,
		to: RawBroadcastStatus,
		also: F,
	) -> Result<RawTransactionBroadcast, StateError>
	where
		F: FnOnce(&mut RawTransactionBroadcast),
	{
		self.update_with(id, |broadcast| {
			if !Self::is_valid_transition(broadcast.status, to) {
				return Err(StateError::InvalidTransition {
					from: broadcast.status.to_string(),
					to: to.to_string(),
				});
			}
			broadcast.status = to;
			broadcast.updated_at = current_timestamp();
			also(broadcast);
			Ok(broadcast.clone())
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use withdrawal_types::RawBroadcastStatus::*;

	#[test]
	fn test_transition_table() {
		assert!(BroadcastStateMachine::is_valid_transition(Pending, Broadcasted));
		assert!(BroadcastStateMachine::is_valid_transition(Pending, Failed));
		assert!(BroadcastStateMachine::is_valid_transition(Broadcasted, Confirmed));

		assert!(!BroadcastStateMachine::is_valid_transition(Broadcasted, Failed));
		assert!(!BroadcastStateMachine::is_valid_transition(Pending, Confirmed));
		assert!(!BroadcastStateMachine::is_valid_transition(Confirmed, Pending));
		assert!(!BroadcastStateMachine::is_valid_transition(Failed, Broadcasted));
	}
}
