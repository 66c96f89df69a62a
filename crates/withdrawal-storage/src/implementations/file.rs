//! File-based storage backend.
//!
//! Each namespace is a subdirectory of the configured base path and each
//! entry is one file inside it, named after an escaped form of its id. Files
//! start with a fixed header identifying the format.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use withdrawal_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header.
///
/// Binary layout (16 bytes total):
/// - [0-3]: Magic bytes "WDRS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-15]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"WDRS";
	const VERSION: u16 = 2;
	const SIZE: usize = 16;

	fn new() -> Self {
		Self {
			version: Self::VERSION,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version != Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(Self { version })
	}
}

/// Turns an id into a file name.
///
/// ASCII letters, digits and `-` are kept. Every other byte becomes `_`
/// followed by its two hex digits, so distinct ids never share a file.
fn encode_id(id: &str) -> String {
	let mut encoded = String::with_capacity(id.len());
	for byte in id.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' {
			encoded.push(byte as char);
		} else {
			encoded.push('_');
			encoded.push_str(&hex::encode([byte]));
		}
	}
	encoded
}

/// Inverse of [`encode_id`]. Returns `None` for names it did not produce.
fn decode_id(name: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(name.len());
	let mut rest = name.as_bytes();
	while let Some((&first, tail)) = rest.split_first() {
		if first == b'_' {
			let escaped = tail.get(..2)?;
			bytes.extend(hex::decode(escaped).ok()?);
			rest = &tail[2..];
		} else {
			bytes.push(first);
			rest = tail;
		}
	}
	String::from_utf8(bytes).ok()
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn split_key(key: &str) -> (&str, &str) {
		key.split_once(':').unwrap_or(("default", key))
	}

	fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StorageError> {
		let valid = !namespace.is_empty()
			&& namespace
				.bytes()
				.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
		if !valid {
			return Err(StorageError::Backend(format!(
				"Invalid namespace: {}",
				namespace
			)));
		}
		Ok(self.base_path.join(namespace))
	}

	fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		let (namespace, id) = Self::split_key(key);
		Ok(self
			.namespace_dir(namespace)?
			.join(format!("{}.bin", encode_id(id))))
	}

	/// Reads an entry, returning `None` when it is absent.
	async fn read_entry(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		FileHeader::deserialize(&data)?;
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	async fn entries(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
		let mut paths = Vec::new();
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			paths.push(entry.path());
		}
		Ok(paths)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_entry(&self.get_file_path(key)?)
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let header = FileHeader::new();

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		// Write to a temp file then rename so readers never see a partial entry
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key)?)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let mut ids = Vec::new();
		for path in Self::entries(&self.namespace_dir(namespace)?).await? {
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				continue;
			};
			match decode_id(stem) {
				Some(id) => ids.push(id),
				None => tracing::debug!("Skipping foreign file {:?}", path),
			}
		}
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::StorageService;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf())
	}

	#[test]
	fn test_header_layout() {
		let header = FileHeader::new();
		let bytes = header.serialize();
		assert_eq!(&bytes[0..4], b"WDRS");
		assert_eq!(FileHeader::deserialize(&bytes).unwrap(), header);
		assert!(FileHeader::deserialize(b"short").is_err());
	}

	#[test]
	fn test_id_encoding() {
		assert_eq!(encode_id("bank-001"), "bank-001");
		assert_eq!(encode_id("BANK/2024/001"), "BANK_2f2024_2f001");
		assert_eq!(encode_id("BANK_2024_001"), "BANK_5f2024_5f001");
		assert_eq!(encode_id(".."), "_2e_2e");

		for id in ["BANK/2024/001", "a_b", "x:y\\z", "résumé", "_2f"] {
			assert_eq!(decode_id(&encode_id(id)).as_deref(), Some(id));
		}
		assert!(decode_id("bad_z").is_none());
		assert!(decode_id("trailing_").is_none());
	}

	#[tokio::test]
	async fn test_roundtrip_in_namespace_directory() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("withdrawals:abc", b"row".to_vec())
			.await
			.unwrap();

		assert!(dir.path().join("withdrawals").join("abc.bin").exists());
		assert_eq!(storage.get_bytes("withdrawals:abc").await.unwrap(), b"row");
		assert!(storage.exists("withdrawals:abc").await.unwrap());
		assert!(!storage.exists("withdrawals:other").await.unwrap());
		assert!(matches!(
			storage.get_bytes("withdrawals:other").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_similar_ids_do_not_collide() {
		let dir = TempDir::new().unwrap();
		let storage = StorageService::new(Box::new(FileStorage::new(dir.path().to_path_buf())));

		storage
			.create("withdrawal_by_request_id", "BANK/2024/001", &"first")
			.await
			.unwrap();
		storage
			.create("withdrawal_by_request_id", "BANK_2024_001", &"second")
			.await
			.unwrap();
		assert!(matches!(
			storage
				.create("withdrawal_by_request_id", "BANK/2024/001", &"third")
				.await,
			Err(StorageError::AlreadyExists(_))
		));

		let first: String = storage
			.retrieve("withdrawal_by_request_id", "BANK/2024/001")
			.await
			.unwrap();
		assert_eq!(first, "first");

		let mut values: Vec<String> = storage.list("withdrawal_by_request_id").await.unwrap();
		values.sort();
		assert_eq!(values, vec!["first".to_string(), "second".to_string()]);
	}

	#[tokio::test]
	async fn test_list_keys() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage.set_bytes("broadcasts:1", vec![1]).await.unwrap();
		storage.set_bytes("broadcasts:a/b", vec![2]).await.unwrap();
		storage.set_bytes("withdrawals:3", vec![3]).await.unwrap();
		fs::write(dir.path().join("broadcasts").join("stray.txt"), b"x")
			.await
			.unwrap();

		let mut ids = storage.list_keys("broadcasts").await.unwrap();
		ids.sort();
		assert_eq!(ids, vec!["1".to_string(), "a/b".to_string()]);
		assert!(storage.list_keys("missing").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_path_traversal_is_neutralized() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage.set_bytes("withdrawals:../escape", vec![1]).await.unwrap();
		assert!(storage.get_bytes("withdrawals:../escape").await.is_ok());
		assert!(!dir.path().join("escape.bin").exists());
		assert!(storage.set_bytes("..:x", vec![1]).await.is_err());
	}

	#[tokio::test]
	async fn test_factory_keeps_rows_regardless_of_ttl_keys() {
		let dir = TempDir::new().unwrap();
		let config: toml::Value = toml::from_str(&format!(
			"storage_path = {:?}\nttl_withdrawals = 1\n",
			dir.path().to_string_lossy()
		))
		.unwrap();
		let storage = create_storage(&config).unwrap();

		storage.set_bytes("withdrawals:kept", vec![1]).await.unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
		assert_eq!(storage.get_bytes("withdrawals:kept").await.unwrap(), vec![1]);
		assert_eq!(storage.list_keys("withdrawals").await.unwrap(), vec!["kept"]);

		let bad: toml::Value = toml::from_str("storage_path = 5").unwrap();
		assert!(create_storage(&bad).is_err());
	}
}
