//! File-based storage backend.
//!
//! Each key maps to one pretty-printed JSON file under the configured
//! directory, written atomically through a temporary file and a rename. Logs
//! live next to it as JSON-lines `.log` files and leases are `fs2` exclusive
//! locks on `.lock` files, so they also exclude other processes.

use crate::{Lease, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use deployer_types::ImplementationRegistry;
use fs2::FileExt;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe path with the given
	/// extension.
	fn get_file_path(&self, key: &str, extension: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.{}", safe_key, extension))
	}

	async fn ensure_base_dir(&self) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key, "json");
		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.ensure_base_dir().await?;
		let path = self.get_file_path(key, "json");

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		let mut file = fs::File::create(&temp_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.write_all(&value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.sync_all()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		drop(file);

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key, "json");
		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key, "json"))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn append_entry(&self, key: &str, entry: Vec<u8>) -> Result<(), StorageError> {
		if entry.contains(&b'\n') {
			return Err(StorageError::Serialization(
				"Log entries must be single-line".into(),
			));
		}
		self.ensure_base_dir().await?;

		let mut line = entry;
		line.push(b'\n');
		let mut file = fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(self.get_file_path(key, "log"))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.write_all(&line)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.sync_data()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn read_entries(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let data = match fs::read(self.get_file_path(key, "log")).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		Ok(data
			.split(|b| *b == b'\n')
			.filter(|line| !line.is_empty())
			.map(<[u8]>::to_vec)
			.collect())
	}

	async fn acquire_lease(&self, key: &str) -> Result<Lease, StorageError> {
		self.ensure_base_dir().await?;
		let path = self.get_file_path(key, "lock");

		let file = std::fs::OpenOptions::new()
			.create(true)
			.truncate(false)
			.read(true)
			.write(true)
			.open(&path)
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		if file.try_lock_exclusive().is_err() {
			return Err(StorageError::LeaseHeld(key.to_string()));
		}

		Ok(Lease::new(key, move || {
			if let Err(e) = FileExt::unlock(&file) {
				tracing::warn!("Failed to unlock {:?}: {}", path, e);
			}
		}))
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/deployments")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = match config.get("storage_path") {
		None => "./data/deployments",
		Some(value) => value.as_str().ok_or_else(|| {
			StorageError::Configuration("storage_path must be a string".to_string())
		})?,
	};

	if storage_path.trim().is_empty() {
		return Err(StorageError::Configuration(
			"storage_path cannot be empty".to_string(),
		));
	}

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_values_survive_a_new_instance() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		storage
			.set_bytes("deployments:hypercore-testnet_TEST0", b"{\"a\":1}".to_vec())
			.await
			.unwrap();

		let reopened = FileStorage::new(dir.path().to_path_buf());
		assert_eq!(
			reopened
				.get_bytes("deployments:hypercore-testnet_TEST0")
				.await
				.unwrap(),
			b"{\"a\":1}".to_vec()
		);
		assert!(dir
			.path()
			.join("deployments_hypercore-testnet_TEST0.json")
			.exists());
		assert!(!dir
			.path()
			.join("deployments_hypercore-testnet_TEST0.tmp")
			.exists());
	}

	#[tokio::test]
	async fn test_missing_key() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		assert!(matches!(
			storage.get_bytes("nope").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("nope").await.unwrap());
		storage.delete("nope").await.unwrap();
	}

	#[tokio::test]
	async fn test_log_appends_lines() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		storage.append_entry("log:k", b"{\"n\":1}".to_vec()).await.unwrap();
		storage.append_entry("log:k", b"{\"n\":2}".to_vec()).await.unwrap();

		let reopened = FileStorage::new(dir.path().to_path_buf());
		assert_eq!(
			reopened.read_entries("log:k").await.unwrap(),
			vec![b"{\"n\":1}".to_vec(), b"{\"n\":2}".to_vec()]
		);
		assert!(storage
			.append_entry("log:k", b"a\nb".to_vec())
			.await
			.is_err());
	}

	#[tokio::test]
	async fn test_lease_excludes_second_holder() {
		let dir = TempDir::new().unwrap();
		let a = FileStorage::new(dir.path().to_path_buf());
		let b = FileStorage::new(dir.path().to_path_buf());

		let lease = a.acquire_lease("leases:k").await.unwrap();
		assert!(matches!(
			b.acquire_lease("leases:k").await,
			Err(StorageError::LeaseHeld(_))
		));
		drop(lease);
		assert!(b.acquire_lease("leases:k").await.is_ok());
	}

	#[test]
	fn test_factory_config() {
		let config: toml::Value = toml::from_str("storage_path = \"/tmp/x\"").unwrap();
		assert!(create_storage(&config).is_ok());

		let config: toml::Value = toml::from_str("storage_path = 3").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
