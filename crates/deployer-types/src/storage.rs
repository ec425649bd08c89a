//! Storage namespaces used by the deployer.

use std::str::FromStr;

/// Storage keys for the deployer's data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Durable deployment records, one per `(chain, token)`.
	Deployments,
	/// Append-only per-key log of dispatch attempts and outcomes.
	DeployLog,
	/// Exclusive single-writer leases.
	Leases,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Deployments => "deployments",
			StorageKey::DeployLog => "deploy_log",
			StorageKey::Leases => "leases",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Deployments, Self::DeployLog, Self::Leases].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"deployments" => Ok(Self::Deployments),
			"deploy_log" => Ok(Self::DeployLog),
			"leases" => Ok(Self::Leases),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
