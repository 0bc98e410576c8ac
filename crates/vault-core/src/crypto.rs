//! Cryptographic operations for the saved API key
//!
//! - PBKDF2-HMAC-SHA256 key derivation from the user's PIN
//! - AES-256-GCM for the key at rest
//! - `salt ‖ nonce ‖ ciphertext+tag`, base64 encoded, as the stored format

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret, SecretString};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{VaultError, VaultResult};

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of PBKDF2 salt in bytes
pub const SALT_SIZE: usize = 16;

/// Bytes preceding the ciphertext in a decoded blob
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// PBKDF2 rounds. This is the only brute-force cost on a short PIN, and
/// blobs do not record it, so changing it orphans every saved key.
pub const PBKDF2_ITERATIONS: u32 = 310_000;

/// Base64 text of `salt ‖ nonce ‖ ciphertext+tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wrap an encoded blob read back from storage
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// AES key derived from a PIN
pub struct DerivedKey {
    key: Secret<[u8; KEY_SIZE]>,
}

impl DerivedKey {
    /// Derive a key from the PIN's UTF-8 bytes
    pub fn derive(pin: &[u8], salt: &[u8; SALT_SIZE]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(pin, salt, PBKDF2_ITERATIONS, &mut key);
        let derived = Self {
            key: Secret::new(key),
        };
        key.zeroize();
        derived
    }

    fn cipher(&self) -> VaultResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    /// Encrypt data using AES-256-GCM under the given nonce
    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
        self.cipher()?
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| VaultError::EncryptionError(e.to_string()))
    }

    /// Decrypt data using AES-256-GCM
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> VaultResult<Vec<u8>> {
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `pin` with a fresh salt and nonce.
///
/// Runs the full key derivation on the calling thread; async callers
/// should use [`encrypt`].
pub fn seal(plaintext: &str, pin: &str) -> VaultResult<EncryptedBlob> {
    let salt = generate_salt();
    let nonce = generate_nonce();
    let key = DerivedKey::derive(pin.as_bytes(), &salt);
    let ciphertext = key.encrypt(plaintext.as_bytes(), &nonce)?;

    let mut combined = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(EncryptedBlob(BASE64.encode(&combined)))
}

/// Decrypt a blob produced by [`seal`].
///
/// Blocking counterpart of [`decrypt`].
pub fn open(blob: &EncryptedBlob, pin: &str) -> VaultResult<SecretString> {
    let combined = Zeroizing::new(
        BASE64
            .decode(blob.as_str().trim())
            .map_err(|_| VaultError::MalformedBlob)?,
    );
    if combined.len() < HEADER_SIZE {
        return Err(VaultError::MalformedBlob);
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    salt.copy_from_slice(&combined[..SALT_SIZE]);
    nonce.copy_from_slice(&combined[SALT_SIZE..HEADER_SIZE]);

    let key = DerivedKey::derive(pin.as_bytes(), &salt);
    let plaintext = key.decrypt(&combined[HEADER_SIZE..], &nonce)?;

    match String::from_utf8(plaintext) {
        Ok(text) => Ok(SecretString::new(text)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(VaultError::DecryptionFailed)
        }
    }
}

/// Encrypt on tokio's blocking pool
pub async fn encrypt(plaintext: SecretString, pin: SecretString) -> VaultResult<EncryptedBlob> {
    tokio::task::spawn_blocking(move || seal(plaintext.expose_secret(), pin.expose_secret()))
        .await?
}

/// Decrypt on tokio's blocking pool
pub async fn decrypt(blob: EncryptedBlob, pin: SecretString) -> VaultResult<SecretString> {
    tokio::task::spawn_blocking(move || open(&blob, pin.expose_secret())).await?
}
