//! Configuration and well-known storage keys

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keys used in the key-value store
pub mod storage_keys {
    /// Base64 `EncryptedBlob` of the API key
    pub const API_KEY_ENCRYPTED: &str = "api_key_encrypted";

    /// Deprecated plaintext API key from before encryption existed.
    /// Read once at startup, then deleted; never written.
    pub const API_KEY_LEGACY: &str = "api_key_session_legacy";

    /// JSON array of recent error reports
    pub const ERROR_LOG: &str = "error_log";
}

/// Vault configuration (non-sensitive, stored in plaintext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Inactivity period after which an exposed key is locked again
    pub session_timeout_seconds: u64,

    /// Quiet period before an edited key/PIN pair is re-encrypted
    pub encrypt_debounce_ms: u64,

    /// Consecutive failed unlocks before lockout
    pub max_unlock_attempts: u32,

    /// Lockout duration in seconds
    pub lockout_duration_seconds: u64,

    /// Shortest PIN that enables saving the key
    pub min_pin_length: usize,

    /// Error reports retained in the error log
    pub max_error_reports: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            session_timeout_seconds: 30 * 60,
            encrypt_debounce_ms: 300,
            max_unlock_attempts: 5,
            lockout_duration_seconds: 30,
            min_pin_length: 4,
            max_error_reports: 50,
        }
    }
}

impl VaultConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    pub fn encrypt_debounce(&self) -> Duration {
        Duration::from_millis(self.encrypt_debounce_ms)
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_seconds)
    }
}
