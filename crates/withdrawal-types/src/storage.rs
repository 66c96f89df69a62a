//! Storage namespaces used by the withdrawal processor.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// Keys are combined with an entity id as `namespace:id` by the storage
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Withdrawal request rows, keyed by internal id.
	Withdrawals,
	/// Uniqueness index from external request id to internal id.
	WithdrawalByRequestId,
	/// Raw broadcast rows, keyed by internal id.
	Broadcasts,
	/// Uniqueness index from transaction hash to broadcast id.
	BroadcastByTxHash,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Withdrawals => "withdrawals",
			StorageKey::WithdrawalByRequestId => "withdrawal_by_request_id",
			StorageKey::Broadcasts => "broadcasts",
			StorageKey::BroadcastByTxHash => "broadcast_by_tx_hash",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Withdrawals,
			Self::WithdrawalByRequestId,
			Self::Broadcasts,
			Self::BroadcastByTxHash,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
