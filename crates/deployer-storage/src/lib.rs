//! Storage module for the spot deployer.
//!
//! This module provides persistence for deployment records behind a pluggable
//! backend. Besides plain key-value operations, every backend offers an
//! append-only log per key and an exclusive lease per key, which together give
//! the single-writer discipline deploy pipelines rely on.

use async_trait::async_trait;
use deployer_types::{ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use thiserror::Error;

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
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Another writer currently holds the lease on this key.
	#[error("Lease held: {0}")]
	LeaseHeld(String),
}

/// Exclusive single-writer lease on a storage key.
///
/// Released when dropped.
pub struct Lease {
	key: String,
	release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Lease {
	pub fn new(key: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			key: key.into(),
			release: Some(Box::new(release)),
		}
	}

	pub fn key(&self) -> &str {
		&self.key
	}
}

impl fmt::Debug for Lease {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Lease").field("key", &self.key).finish()
	}
}

impl Drop for Lease {
	fn drop(&mut self) {
		if let Some(release) = self.release.take() {
			release();
			tracing::debug!(key = %self.key, "Released lease");
		}
	}
}

/// Trait defining the low-level interface for storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value atomically.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Appends one entry to the append-only log of the given key.
	async fn append_entry(&self, key: &str, entry: Vec<u8>) -> Result<(), StorageError>;

	/// Reads every entry of the log of the given key, oldest first.
	async fn read_entries(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError>;

	/// Takes the exclusive lease on the given key without waiting.
	///
	/// Fails with [`StorageError::LeaseHeld`] if another holder has it.
	async fn acquire_lease(&self, key: &str) -> Result<Lease, StorageError>;
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

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id` keys.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn compose_key(namespace: StorageKey, id: &str) -> String {
	format!("{}:{}", namespace.as_str(), id)
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec_pretty(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&compose_key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&compose_key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value, mapping `NotFound` to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Updates an existing value in storage.
	///
	/// Returns `NotFound` if the key doesn't exist, unlike `store` which
	/// creates or overwrites.
	pub async fn update<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		if !self.exists(namespace, id).await? {
			return Err(StorageError::NotFound);
		}
		self.store(namespace, id, data).await
	}

	pub async fn remove(&self, namespace: StorageKey, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&compose_key(namespace, id)).await
	}

	pub async fn exists(&self, namespace: StorageKey, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&compose_key(namespace, id)).await
	}

	/// Appends one serialized entry to the log of `namespace:id`.
	pub async fn append<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		entry: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.append_entry(&compose_key(namespace, id), bytes).await
	}

	/// Reads back the whole log of `namespace:id`. A missing log is empty.
	pub async fn read_log<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Vec<T>, StorageError> {
		self.backend
			.read_entries(&compose_key(namespace, id))
			.await?
			.iter()
			.map(|bytes| {
				serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Takes the exclusive lease on `namespace:id`.
	pub async fn acquire_lease(&self, namespace: StorageKey, id: &str) -> Result<Lease, StorageError> {
		let key = compose_key(namespace, id);
		let lease = self.backend.acquire_lease(&key).await?;
		tracing::debug!(key = %key, "Acquired lease");
		Ok(lease)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Record {
		name: String,
		stage: u8,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_round_trip_and_update() {
		let storage = service();
		let record = Record {
			name: "TEST0".into(),
			stage: 1,
		};

		assert!(matches!(
			storage.update(StorageKey::Deployments, "a", &record).await,
			Err(StorageError::NotFound)
		));
		assert_eq!(
			storage
				.retrieve_optional::<Record>(StorageKey::Deployments, "a")
				.await
				.unwrap(),
			None
		);

		storage.store(StorageKey::Deployments, "a", &record).await.unwrap();
		let updated = Record {
			name: "TEST0".into(),
			stage: 2,
		};
		storage.update(StorageKey::Deployments, "a", &updated).await.unwrap();
		let back: Record = storage.retrieve(StorageKey::Deployments, "a").await.unwrap();
		assert_eq!(back, updated);

		storage.remove(StorageKey::Deployments, "a").await.unwrap();
		assert!(!storage.exists(StorageKey::Deployments, "a").await.unwrap());
	}

	#[tokio::test]
	async fn test_namespaces_are_isolated() {
		let storage = service();
		storage.store(StorageKey::Deployments, "x", &1u32).await.unwrap();
		assert!(!storage.exists(StorageKey::Leases, "x").await.unwrap());
	}

	#[tokio::test]
	async fn test_log_preserves_order() {
		let storage = service();
		for stage in 0..3u8 {
			storage
				.append(
					StorageKey::DeployLog,
					"k",
					&Record {
						name: "e".into(),
						stage,
					},
				)
				.await
				.unwrap();
		}
		let log: Vec<Record> = storage.read_log(StorageKey::DeployLog, "k").await.unwrap();
		assert_eq!(log.iter().map(|r| r.stage).collect::<Vec<_>>(), vec![0, 1, 2]);

		let empty: Vec<Record> = storage.read_log(StorageKey::DeployLog, "other").await.unwrap();
		assert!(empty.is_empty());
	}

	#[tokio::test]
	async fn test_lease_is_exclusive_until_dropped() {
		let storage = service();
		let lease = storage.acquire_lease(StorageKey::Leases, "k").await.unwrap();
		assert_eq!(lease.key(), "leases:k");
		assert!(matches!(
			storage.acquire_lease(StorageKey::Leases, "k").await,
			Err(StorageError::LeaseHeld(_))
		));
		assert!(storage.acquire_lease(StorageKey::Leases, "other").await.is_ok());

		drop(lease);
		assert!(storage.acquire_lease(StorageKey::Leases, "k").await.is_ok());
	}
}
