//! Withdrawal state machine implementation.
//!
//! Withdrawals move PENDING_SIGNATURE -> PROCESSING -> BROADCASTED ->
//! COMPLETED. A request may be cancelled before processing starts, and a
//! request whose retries are exhausted while PROCESSING becomes FAILED.
//! Every transition appends exactly one history entry in the same write.

use super::StateError;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use withdrawal_storage::StorageService;
use withdrawal_types::{current_timestamp, StorageKey, WithdrawalRequest, WithdrawalStatus};

/// Manages withdrawal state transitions and persistence.
pub struct WithdrawalStateMachine {
	storage: Arc<StorageService>,
}

impl WithdrawalStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: WithdrawalStatus, to: WithdrawalStatus) -> bool {
		// Static transition table - each state maps to allowed next states
		static TRANSITIONS: Lazy<HashMap<WithdrawalStatus, HashSet<WithdrawalStatus>>> =
			Lazy::new(|| {
				use withdrawal_types::WithdrawalStatus::*;

				let mut m = HashMap::new();
				m.insert(PendingSignature, HashSet::from([Processing, Cancelled]));
				m.insert(Processing, HashSet::from([Broadcasted, Failed]));
				m.insert(Broadcasted, HashSet::from([Completed]));
				m.insert(Completed, HashSet::new()); // terminal
				m.insert(Cancelled, HashSet::new()); // terminal
				m.insert(Failed, HashSet::new()); // terminal
				m
			});

		TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Validates and applies a transition to an in-memory request.
	///
	/// Records the history entry for it. Nothing is persisted.
	pub fn apply(
		request: &mut WithdrawalRequest,
		to: WithdrawalStatus,
		note: Option<String>,
	) -> Result<(), StateError> {
		if !Self::is_valid_transition(request.status, to) {
			return Err(StateError::InvalidTransition {
				from: request.status.to_string(),
				to: to.to_string(),
			});
		}
		request.record_transition(to, note, current_timestamp());
		Ok(())
	}

	/// Gets a withdrawal by ID, or `None` if it does not exist.
	pub async fn get(&self, id: &str) -> Result<Option<WithdrawalRequest>, StateError> {
		Ok(self
			.storage
			.find(StorageKey::Withdrawals.as_str(), id)
			.await?)
	}

	/// Runs `updater` against the stored request under the key's write lock.
	///
	/// Nothing is written when `updater` fails.
	pub async fn update_with<R, F>(&self, id: &str, updater: F) -> Result<R, StateError>
	where
		F: FnOnce(&mut WithdrawalRequest) -> Result<R, StateError>,
	{
		self.storage
			.update_with(StorageKey::Withdrawals.as_str(), id, updater)
			.await
	}

	/// Transitions a withdrawal to a new status with validation.
	///
	/// `also` runs after the transition is recorded, in the same write.
	pub async fn transition<F>(
		&self,
		id: &str,
		to: WithdrawalStatus,
		note: Option<String>,
		also: F,
	) -> Result<WithdrawalRequest, StateError>
	where
		F: FnOnce(&mut WithdrawalRequest),
	{
		self.update_with(id, |request| {
			Self::apply(request, to, note)?;
			also(request);
			Ok(request.clone())
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Address;
	use withdrawal_storage::implementations::memory::MemoryStorage;
	use withdrawal_types::WithdrawalStatus::*;

	const ALL: [WithdrawalStatus; 6] = [
		PendingSignature,
		Processing,
		Broadcasted,
		Completed,
		Cancelled,
		Failed,
	];

	fn request(id: &str) -> WithdrawalRequest {
		let mut request = WithdrawalRequest {
			id: id.to_string(),
			request_id: format!("bank-{}", id),
			status: PendingSignature,
			treasury_address: Address::ZERO,
			destination_address: Address::ZERO,
			token_address: Address::ZERO,
			amount: "1".to_string(),
			signed_payload: "0x01".to_string(),
			tx_hash: None,
			error_message: None,
			created_at: 0,
			updated_at: 0,
			history: Vec::new(),
		};
		request.record_transition(PendingSignature, None, 0);
		request
	}

	#[test]
	fn test_only_documented_edges_are_allowed() {
		let allowed = [
			(PendingSignature, Processing),
			(PendingSignature, Cancelled),
			(Processing, Broadcasted),
			(Processing, Failed),
			(Broadcasted, Completed),
		];

		for from in ALL {
			for to in ALL {
				assert_eq!(
					WithdrawalStateMachine::is_valid_transition(from, to),
					allowed.contains(&(from, to)),
					"{} -> {}",
					from,
					to
				);
			}
		}
	}

	#[test]
	fn test_apply_rejects_invalid_transition_without_history() {
		let mut req = request("w-1");
		let result = WithdrawalStateMachine::apply(&mut req, Completed, None);
		assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
		assert_eq!(req.status, PendingSignature);
		assert_eq!(req.history.len(), 1);
	}

	#[tokio::test]
	async fn test_transition_persists_status_and_history() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = WithdrawalStateMachine::new(storage.clone());
		storage
			.create(StorageKey::Withdrawals.as_str(), "w-1", &request("w-1"))
			.await
			.unwrap();

		let updated = machine
			.transition("w-1", Processing, None, |r| r.error_message = None)
			.await
			.unwrap();
		assert_eq!(updated.status, Processing);

		let stored = machine.get("w-1").await.unwrap().unwrap();
		assert_eq!(stored.history.len(), 2);
		assert_eq!(stored.history[1].from_status, Some(PendingSignature));

		let invalid = machine.transition("w-1", Cancelled, None, |_| {}).await;
		assert!(matches!(invalid, Err(StateError::InvalidTransition { .. })));
		assert_eq!(machine.get("w-1").await.unwrap().unwrap().history.len(), 2);
	}

	#[tokio::test]
	async fn test_missing_withdrawal() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = WithdrawalStateMachine::new(storage);
		assert!(machine.get("nope").await.unwrap().is_none());
		assert!(matches!(
			machine.transition("nope", Processing, None, |_| {}).await,
			Err(StateError::NotFound)
		));
	}
}
