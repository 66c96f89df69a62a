//! Request store for the withdrawal processor.
//!
//! This module provides a key-value abstraction over pluggable backends and a
//! typed [`StorageService`] on top of it. The service is the single source of
//! truth for withdrawal and broadcast rows: every read-modify-write goes
//! through [`StorageService::update_with`], which serializes writers per key.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use withdrawal_types::{ConfigSchema, ImplementationRegistry};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when creating a key that is already present.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys have the form `namespace:id`. Backends store opaque bytes and never
/// drop an entry on their own.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any existing value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists the ids stored under a namespace, in no particular order.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn storage_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON. Rows are written only through `create` and
/// `update_with`, which hold a per-key async lock for the duration of the
/// read and the write. Nothing is ever deleted.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	/// Per-key write locks, removed once uncontended.
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			locks: DashMap::new(),
		}
	}

	/// Runs `op` while holding the write lock for `key`.
	async fn locked<F, Fut, R>(&self, key: &str, op: F) -> R
	where
		F: FnOnce() -> Fut,
		Fut: std::future::Future<Output = R>,
	{
		let lock = self.locks.entry(key.to_string()).or_default().clone();
		let guard = lock.lock_owned().await;
		let result = op().await;
		drop(guard);
		self.locks
			.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
		result
	}

	/// Stores a value only if the key is absent.
	///
	/// Fails with [`StorageError::AlreadyExists`] otherwise. This is the
	/// primitive behind every uniqueness index.
	pub async fn create<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		let bytes = encode(data)?;
		self.locked(&key, || async {
			if self.backend.exists(&key).await? {
				return Err(StorageError::AlreadyExists(key.clone()));
			}
			self.backend.set_bytes(&key, bytes).await
		})
		.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&storage_key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Retrieves a value, mapping absence to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Retrieves every value stored under a namespace.
	///
	/// Entries removed between listing and reading are skipped.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let ids = self.backend.list_keys(namespace).await?;
		let mut values = Vec::with_capacity(ids.len());
		for id in ids {
			match self.retrieve(namespace, &id).await {
				Ok(value) => values.push(value),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Atomically reads, modifies and writes back a value.
	///
	/// `mutate` runs against the current value while the key's lock is held.
	/// If it returns an error nothing is written. If it leaves the value
	/// unchanged the write is skipped. Concurrent callers on the same key run
	/// one after another, each seeing the previous caller's result.
	pub async fn update_with<T, R, E, F>(
		&self,
		namespace: &str,
		id: &str,
		mutate: F,
	) -> Result<R, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(&mut T) -> Result<R, E>,
		E: From<StorageError>,
	{
		let key = storage_key(namespace, id);
		self.locked(&key, || async {
			let before = self.backend.get_bytes(&key).await?;
			let mut value: T = decode(&before)?;
			let result = mutate(&mut value)?;
			let after = encode(&value)?;
			if after != before {
				self.backend.set_bytes(&key, after).await?;
			}
			Ok(result)
		})
		.await
	}

	/// Checks that the backend answers requests.
	pub async fn health_check(&self) -> Result<(), StorageError> {
		self.backend.exists("health:probe").await.map(|_| ())
	}
}
