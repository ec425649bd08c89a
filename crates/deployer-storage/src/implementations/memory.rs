//! In-memory storage backend.
//!
//! Useful for tests and dry runs where persistence across restarts is not
//! required. Leases are tracked in a process-local set.

use crate::{Lease, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use deployer_types::ImplementationRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
	logs: Arc<RwLock<HashMap<String, Vec<Vec<u8>>>>>,
	// Lease release runs in `Drop`, so this set needs a synchronous lock.
	leases: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn append_entry(&self, key: &str, entry: Vec<u8>) -> Result<(), StorageError> {
		let mut logs = self.logs.write().await;
		logs.entry(key.to_string()).or_default().push(entry);
		Ok(())
	}

	async fn read_entries(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let logs = self.logs.read().await;
		Ok(logs.get(key).cloned().unwrap_or_default())
	}

	async fn acquire_lease(&self, key: &str) -> Result<Lease, StorageError> {
		let mut held = self
			.leases
			.lock()
			.map_err(|e| StorageError::Backend(format!("Lease set poisoned: {}", e)))?;
		if !held.insert(key.to_string()) {
			return Err(StorageError::LeaseHeld(key.to_string()));
		}

		let leases = Arc::clone(&self.leases);
		let owned = key.to_string();
		Ok(Lease::new(key, move || {
			if let Ok(mut held) = leases.lock() {
				held.remove(&owned);
			}
		}))
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Memory storage takes no configuration.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "test_key";
		let value = b"test_value".to_vec();
		storage.set_bytes(key, value.clone()).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_log_is_independent_of_value() {
		let storage = MemoryStorage::new();
		storage.append_entry("k", b"1".to_vec()).await.unwrap();
		storage.append_entry("k", b"2".to_vec()).await.unwrap();
		assert!(!storage.exists("k").await.unwrap());
		assert_eq!(
			storage.read_entries("k").await.unwrap(),
			vec![b"1".to_vec(), b"2".to_vec()]
		);
	}

	#[tokio::test]
	async fn test_concurrent_lease_attempts_admit_one_holder() {
		let storage = Arc::new(MemoryStorage::new());
		let mut handles = Vec::new();
		for _ in 0..8 {
			let storage = Arc::clone(&storage);
			handles.push(tokio::spawn(async move { storage.acquire_lease("k").await }));
		}

		let mut granted = Vec::new();
		for handle in handles {
			if let Ok(lease) = handle.await.unwrap() {
				granted.push(lease);
			}
		}
		assert_eq!(granted.len(), 1);
	}
}
