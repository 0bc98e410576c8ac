//! Error types for vault operations

use thiserror::Error;

/// Errors that can occur during vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Vault is locked - unlock with PIN first")]
    VaultLocked,

    #[error("Vault is not locked")]
    NotLocked,

    #[error("No saved API key to unlock")]
    NothingToUnlock,

    /// Covers both a wrong PIN and a damaged stored key; callers never learn which.
    #[error("Invalid PIN ({attempt}/{max})")]
    InvalidPin { attempt: u32, max: u32 },

    #[error("Too many failed unlock attempts - locked out for {0} seconds")]
    LockedOut(u64),

    #[error("Encrypted key is malformed")]
    MalformedBlob,

    #[error("Decryption failed - wrong PIN or corrupted data")]
    DecryptionFailed,

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("PIN must be at least {0} characters")]
    PinTooShort(usize),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Vault service has stopped")]
    ServiceStopped,
}

impl VaultError {
    /// True for the failures a PIN attempt can produce inside the crypto layer.
    pub fn is_decrypt_failure(&self) -> bool {
        matches!(self, VaultError::MalformedBlob | VaultError::DecryptionFailed)
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(e: tokio::task::JoinError) -> Self {
        VaultError::TaskFailed(e.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
