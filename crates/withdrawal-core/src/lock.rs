//! Per-request exclusivity.
//!
//! The broker never hands one job to two consumers, but two distinct jobs may
//! reference the same stored request. [`RequestLocks`] serializes their
//! deliveries within this process.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex.
#[derive(Default)]
pub struct RequestLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RequestLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits until no other holder of `key` remains and returns a guard.
	///
	/// The lock is released when the guard is dropped, including during a
	/// panic unwind.
	pub async fn acquire(&self, key: &str) -> RequestGuard<'_> {
		let lock = self.locks.entry(key.to_string()).or_default().clone();
		let guard = lock.lock_owned().await;
		RequestGuard {
			locks: self,
			key: key.to_string(),
			guard: Some(guard),
		}
	}

	/// Number of keys currently held or awaited.
	pub fn len(&self) -> usize {
		self.locks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.locks.is_empty()
	}
}

/// Holds one key of a [`RequestLocks`].
pub struct RequestGuard<'a> {
	locks: &'a RequestLocks,
	key: String,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RequestGuard<'_> {
	fn drop(&mut self) {
		drop(self.guard.take());
		self.locks
			.locks
			.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_key_is_serialized() {
		let locks = Arc::new(RequestLocks::new());
		let order = Arc::new(std::sync::Mutex::new(Vec::new()));

		let first = locks.acquire("withdrawals:a").await;

		let waiter = {
			let locks = locks.clone();
			let order = order.clone();
			tokio::spawn(async move {
				let _guard = locks.acquire("withdrawals:a").await;
				order.lock().unwrap().push("second");
			})
		};

		tokio::time::sleep(Duration::from_millis(20)).await;
		order.lock().unwrap().push("first");
		drop(first);

		waiter.await.unwrap();
		assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
		assert!(locks.is_empty());
	}

	#[tokio::test]
	async fn test_distinct_keys_do_not_block() {
		let locks = RequestLocks::new();
		let _a = locks.acquire("withdrawals:a").await;
		let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("withdrawals:b")).await;
		assert!(b.is_ok());
		assert_eq!(locks.len(), 2);
	}
}
