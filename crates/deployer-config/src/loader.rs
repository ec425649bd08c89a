//! Loader for configurations split across several files.
//!
//! A root file may pull in other files with `include`. Included files cannot
//! include further files, and every top-level section must come from exactly
//! one file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// Loads a root configuration file together with its includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths read so far.
	seen: HashSet<PathBuf>,
	/// Section name to the file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			seen: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Reads `config_path` and its includes, merges them and parses the result
	/// into a validated [`Config`].
	pub async fn load_config(&mut self, config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let root_path = self.locate(config_path.as_ref()).await?;
		let mut root = self.read_table(&root_path).await?;

		let includes = match root.remove("include") {
			None => Vec::new(),
			Some(value) => include_list(value)?,
		};
		self.claim_sections(&root, &root_path)?;

		for include in includes {
			let path = self.locate(&include).await?;
			let table = self.read_table(&path).await?;
			if table.contains_key("include") {
				return Err(ConfigError::Validation(format!(
					"{} has its own include; only the root file may include others",
					path.display()
				)));
			}
			self.claim_sections(&table, &path)?;
			root.extend(table);
		}

		let merged = toml::to_string(&root)
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize merged config: {}", e)))?;
		merged.parse()
	}

	/// Reads a file at most once, with environment variables substituted.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await?;
		if !self.seen.insert(canonical) {
			return Err(ConfigError::Validation(format!(
				"Circular include: {} was already loaded",
				path.display()
			)));
		}
		let raw = tokio::fs::read_to_string(path).await?;
		Ok(toml::from_str(&resolve_env_vars(&raw)?)?)
	}

	/// Records which file owns each top-level section of `table`.
	fn claim_sections(&mut self, table: &toml::Table, path: &Path) -> Result<(), ConfigError> {
		for section in table.keys() {
			if let Some(owner) = self.owners.get(section) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					section,
					owner.display(),
					path.display()
				)));
			}
			self.owners.insert(section.clone(), path.to_path_buf());
		}
		Ok(())
	}

	/// Resolves `path` against the base directory and checks it exists.
	async fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};
		if !tokio::fs::try_exists(&resolved).await? {
			return Err(ConfigError::Io(io::Error::new(
				io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Accepts `include = "file.toml"` or `include = ["a.toml", "b.toml"]`.
fn include_list(value: toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				other => Err(ConfigError::Validation(format!(
					"include entries must be strings, got {}",
					other.type_str()
				))),
			})
			.collect(),
		other => Err(ConfigError::Validation(format!(
			"include must be a string or an array of strings, got {}",
			other.type_str()
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const DEPLOYER_SECTION: &str = r#"
[deployer]
id = "test-deployer"
network = "testnet"
"#;

	const BACKENDS: &str = r#"
[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[exchange]
primary = "mock"
[exchange.implementations.mock]

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	const PLAN: &str = r#"
[deployments.TEST0]
sz_decimals = 2
wei_decimals = 8
max_gas = 1000000000000
max_supply = "100000000900000000"

[deployments.TEST0.hyperliquidity]
start_px = "2.0"
order_sz = "4.0"
n_orders = 0
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(&config_path, format!("{}{}{}", DEPLOYER_SECTION, BACKENDS, PLAN)).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.deployer.id, "test-deployer");
		assert!(config.deployments.contains_key("TEST0"));
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!(
			"include = [\"backends.toml\", \"deployments.toml\"]\n{}",
			DEPLOYER_SECTION
		);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();
		fs::write(temp_dir.path().join("deployments.toml"), PLAN).unwrap();

		let config = Config::from_file(temp_dir.path().join("main.toml").to_str().unwrap())
			.await
			.unwrap();

		assert_eq!(config.deployer.id, "test-deployer");
		assert_eq!(config.storage.primary, "memory");
		assert_eq!(config.deployment("TEST0").unwrap().wei_decimals, 8);
	}

	#[tokio::test]
	async fn test_single_string_include() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = \"backends.toml\"\n{}", DEPLOYER_SECTION);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.account.primary, "local");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"duplicate.toml\"]\n{}", DEPLOYER_SECTION);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("duplicate.toml"), DEPLOYER_SECTION).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'deployer'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();

		let config = format!("include = [\"self.toml\"]\n{}", DEPLOYER_SECTION);
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include_is_io_error() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"missing.toml\"]\n{}", DEPLOYER_SECTION);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
