//! Key-value persistence for the vault
//!
//! The vault only talks to a [`KeyValueStore`]. Two adapters exist:
//! - [`MemoryStore`] for tests and throwaway sessions
//! - [`FileStore`], a JSON map on disk with atomic writes
//!
//! The config file helpers live here too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;

use crate::error::{VaultError, VaultResult};
use crate::models::VaultConfig;

/// Default data directory name
const DATA_DIR: &str = ".figlab";

/// Key-value store file name
const STORE_FILE: &str = "storage.json";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// String key-value storage, the shape of browser local storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> VaultResult<()>;
    fn delete(&self, key: &str) -> VaultResult<()>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| VaultError::StorageError("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> VaultResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// JSON-file store. Every write replaces the file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the store inside `base_dir`
    pub fn open(base_dir: &Path) -> VaultResult<Self> {
        ensure_data_dir_sync(base_dir)?;
        Ok(Self {
            path: store_file_path(base_dir),
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> VaultResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> VaultResult<()> {
        let data = serde_json::to_vec_pretty(map)?;

        // Write atomically (write to temp, then rename)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &data)?;

        // Set file permissions to 600 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)?;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn modify<F>(&self, f: F) -> VaultResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| VaultError::StorageError("file store poisoned".to_string()))?;
        let mut map = self.read_map()?;
        if f(&mut map) {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn delete(&self, key: &str) -> VaultResult<()> {
        self.modify(|map| map.remove(key).is_some())
    }
}

/// Get the default data directory path
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
}

/// Get the key-value store file path
pub fn store_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(STORE_FILE)
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

fn ensure_data_dir_sync(base_dir: &Path) -> VaultResult<()> {
    if !base_dir.exists() {
        std::fs::create_dir_all(base_dir)?;

        // Set directory permissions to 700 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(base_dir, perms)?;
        }
    }
    Ok(())
}

/// Ensure the data directory exists with proper permissions
pub async fn ensure_data_dir(base_dir: &Path) -> VaultResult<()> {
    let base_dir = base_dir.to_path_buf();
    tokio::task::spawn_blocking(move || ensure_data_dir_sync(&base_dir)).await?
}

/// Load vault configuration
pub async fn load_config(base_dir: &Path) -> VaultResult<VaultConfig> {
    let config_path = config_file_path(base_dir);

    if !config_path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = fs::read_to_string(&config_path).await?;
    let config: VaultConfig =
        toml::from_str(&content).map_err(|e| VaultError::ConfigError(e.to_string()))?;

    Ok(config)
}

/// Save vault configuration
pub async fn save_config(base_dir: &Path, config: &VaultConfig) -> VaultResult<()> {
    ensure_data_dir(base_dir).await?;

    let config_path = config_file_path(base_dir);
    let content =
        toml::to_string_pretty(config).map_err(|e| VaultError::ConfigError(e.to_string()))?;

    fs::write(&config_path, content).await?;

    Ok(())
}
