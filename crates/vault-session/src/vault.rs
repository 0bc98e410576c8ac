//! Credential vault
//!
//! Owns the lifecycle of the generative-API key:
//! - `Empty`: nothing held, nothing saved (ready for input)
//! - `Unlocked`: key in memory, optionally mirrored to an encrypted blob
//! - `Locked`: only the encrypted blob exists; a PIN brings the key back
//!
//! Every persisted write goes through this type. Time-driven work (the
//! encryption debounce and the inactivity lock) happens in [`CredentialVault::tick`],
//! which the owner calls once [`CredentialVault::next_deadline`] has passed.

use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use vault_core::{
    crypto, earliest, storage_keys, Clock, EncryptedBlob, ErrorReporter, KeyValueStore, Timer,
    VaultConfig, VaultError, VaultResult,
};

use crate::guard::{ActivityEvent, SessionGuard};

/// Externally visible lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultPhase {
    Empty,
    Locked,
    Unlocked,
}

impl std::fmt::Display for VaultPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VaultPhase::Empty => "empty",
            VaultPhase::Locked => "locked",
            VaultPhase::Unlocked => "unlocked",
        };
        f.write_str(name)
    }
}

enum Phase {
    Empty,
    Locked,
    Unlocked(SecretString),
}

impl Phase {
    fn holding(secret: SecretString) -> Self {
        if secret.expose_secret().is_empty() {
            Phase::Empty
        } else {
            Phase::Unlocked(secret)
        }
    }
}

/// Snapshot for display; never contains the key or PIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    pub phase: VaultPhase,
    pub remember: bool,
    pub has_saved_key: bool,
    pub pin_entered: bool,
    /// Failed attempts since the last success or lockout
    pub unlock_attempts: u32,
    pub lockout_remaining_seconds: u64,
    /// Message for the last failed unlock, cleared on success
    pub unlock_error: Option<String>,
    pub session_guard_active: bool,
}

/// What [`CredentialVault::initialize`] found in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// An encrypted key exists; a PIN is needed
    Locked,
    /// A pre-encryption plaintext key was consumed and is now unlocked.
    /// Reported exactly once so callers can run first-use work.
    MigratedLegacy,
    Empty,
    AlreadyInitialized,
}

/// Result of time-driven work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    /// The inactivity guard expired and the key was dropped from memory
    SessionLocked,
    Persisted,
    /// The saved blob already holds this key under this PIN
    PersistSkipped,
    /// Recorded in the error log; nothing surfaced to the user
    PersistFailed,
}

/// Flips a vault to inactive from outside its owner. Writes that finish
/// after the flip are dropped.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn trigger(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        !self.0.load(Ordering::SeqCst)
    }
}

pub struct CredentialVault<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: VaultConfig,
    phase: Phase,
    remember: bool,
    pin: SecretString,
    saved_blob: Option<EncryptedBlob>,
    unlock_attempts: u32,
    locked_until: Option<Instant>,
    unlock_error: Option<String>,
    persist_timer: Timer,
    guard: SessionGuard,
    initialized: bool,
    active: Arc<AtomicBool>,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().clone())
}

/// Whole seconds left, rounded up
fn remaining_seconds(remaining: Duration) -> u64 {
    let millis = remaining.as_millis() as u64;
    millis.div_ceil(1000)
}

impl<S: KeyValueStore> CredentialVault<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: VaultConfig) -> Self {
        let guard = SessionGuard::new(config.session_timeout());
        Self {
            store,
            clock,
            config,
            phase: Phase::Empty,
            remember: false,
            pin: empty_secret(),
            saved_blob: None,
            unlock_attempts: 0,
            locked_until: None,
            unlock_error: None,
            persist_timer: Timer::new(),
            guard,
            initialized: false,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, Phase::Locked)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The unlocked key, for use as a bearer credential
    pub fn secret(&self) -> Option<&SecretString> {
        match &self.phase {
            Phase::Unlocked(secret) => Some(secret),
            _ => None,
        }
    }

    pub fn status(&self) -> VaultStatus {
        let now = self.now();
        let lockout_remaining_seconds = match self.locked_until {
            Some(until) if now < until => remaining_seconds(until - now),
            _ => 0,
        };

        VaultStatus {
            phase: match self.phase {
                Phase::Empty => VaultPhase::Empty,
                Phase::Locked => VaultPhase::Locked,
                Phase::Unlocked(_) => VaultPhase::Unlocked,
            },
            remember: self.remember,
            has_saved_key: self.saved_blob.is_some(),
            pin_entered: !self.pin.expose_secret().is_empty(),
            unlock_attempts: self.unlock_attempts,
            lockout_remaining_seconds,
            unlock_error: self.unlock_error.clone(),
            session_guard_active: self.guard.is_active(),
        }
    }

    fn reporter(&self) -> ErrorReporter<'_> {
        let reporter = ErrorReporter::new(&self.store, self.config.max_error_reports);
        match &self.phase {
            Phase::Unlocked(secret) => reporter.with_secret(secret.expose_secret()),
            _ => reporter,
        }
    }

    /// Load persisted state. Only the first call does anything.
    ///
    /// An encrypted key wins over a legacy plaintext one; the plaintext is
    /// deleted in either case and never written back.
    pub fn initialize(&mut self) -> VaultResult<InitOutcome> {
        if self.initialized {
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let outcome = self.load_persisted()?;
        self.initialized = true;
        self.sync_guard();
        Ok(outcome)
    }

    fn load_persisted(&mut self) -> VaultResult<InitOutcome> {
        let saved = self
            .store
            .get(storage_keys::API_KEY_ENCRYPTED)?
            .filter(|encoded| !encoded.is_empty());
        let legacy = self.store.get(storage_keys::API_KEY_LEGACY)?;

        if let Some(encoded) = saved {
            if legacy.is_some() {
                self.store.delete(storage_keys::API_KEY_LEGACY)?;
                warn!("Discarded legacy plaintext API key; encrypted key takes precedence");
            }
            self.saved_blob = Some(EncryptedBlob::from_encoded(encoded));
            self.phase = Phase::Locked;
            self.remember = true;
            info!("Encrypted API key found - vault locked");
            return Ok(InitOutcome::Locked);
        }

        if let Some(plaintext) = legacy {
            self.store.delete(storage_keys::API_KEY_LEGACY)?;
            if !plaintext.is_empty() {
                self.phase = Phase::Unlocked(SecretString::new(plaintext));
                info!("Migrated legacy plaintext API key");
                return Ok(InitOutcome::MigratedLegacy);
            }
        }

        Ok(InitOutcome::Empty)
    }

    /// Replace the in-memory key. Rejected while locked.
    pub fn set_secret(&mut self, value: impl Into<String>) -> VaultResult<()> {
        if self.is_locked() {
            return Err(VaultError::VaultLocked);
        }

        self.phase = Phase::holding(SecretString::new(value.into()));

        // Typing the key is activity in its own right
        let now = self.now();
        self.guard.record_activity(ActivityEvent::KeyDown, now);

        self.schedule_persist();
        self.sync_guard();
        Ok(())
    }

    /// Replace the PIN field. While unlocked this re-arms the encryption debounce.
    pub fn set_pin(&mut self, pin: impl Into<String>) {
        self.pin = SecretString::new(pin.into());
        if !self.is_locked() {
            self.schedule_persist();
        }
    }

    /// Toggle saving the key. Turning it off deletes the saved blob at once.
    pub fn set_remember(&mut self, remember: bool) -> VaultResult<()> {
        if self.is_locked() {
            return Err(VaultError::VaultLocked);
        }

        self.remember = remember;
        if remember {
            self.schedule_persist();
            return Ok(());
        }

        self.persist_timer.cancel();
        if self.saved_blob.is_some() {
            self.store.delete(storage_keys::API_KEY_ENCRYPTED)?;
            self.saved_blob = None;
            info!("Saved API key removed");
        }
        self.sync_guard();
        Ok(())
    }

    fn schedule_persist(&mut self) {
        if !self.is_active() {
            return;
        }
        let now = self.now();
        self.persist_timer.arm(now, self.config.encrypt_debounce());
    }

    /// Key and PIN to save, if saving is currently wanted
    fn persist_target(&self) -> Option<(SecretString, SecretString)> {
        let Phase::Unlocked(secret) = &self.phase else {
            return None;
        };
        if !self.remember || self.pin.expose_secret().chars().count() < self.config.min_pin_length
        {
            return None;
        }
        Some((copy_secret(secret), copy_secret(&self.pin)))
    }

    async fn run_persist(&mut self) -> TickOutcome {
        let Some((secret, pin)) = self.persist_target() else {
            return TickOutcome::Idle;
        };

        if let Some(blob) = &self.saved_blob {
            match crypto::decrypt(blob.clone(), copy_secret(&pin)).await {
                Ok(existing) if existing.expose_secret() == secret.expose_secret() => {
                    debug!("Saved API key is current - skipping write");
                    return TickOutcome::PersistSkipped;
                }
                Ok(_) => debug!("API key changed - re-encrypting"),
                Err(VaultError::MalformedBlob) => {
                    warn!("Saved API key is malformed - overwriting with a fresh blob")
                }
                Err(_) => debug!("Saved API key does not open with the current PIN - re-encrypting"),
            }
        }

        let blob = match crypto::encrypt(secret, pin).await {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to encrypt API key: {}", e);
                self.reporter().record("Encryption", &e.to_string());
                return TickOutcome::PersistFailed;
            }
        };

        if !self.is_active() {
            debug!("Vault shut down during encryption - dropping write");
            return TickOutcome::Idle;
        }

        if let Err(e) = self.store.set(storage_keys::API_KEY_ENCRYPTED, blob.as_str()) {
            error!("Failed to save encrypted API key: {}", e);
            self.reporter().record("Storage", &e.to_string());
            return TickOutcome::PersistFailed;
        }

        self.saved_blob = Some(blob);
        info!("API key encrypted and saved");
        self.sync_guard();
        TickOutcome::Persisted
    }

    /// Try a PIN against the saved key.
    ///
    /// During a lockout window this fails without touching the crypto layer.
    /// A wrong PIN and a damaged blob produce the same error.
    pub async fn unlock(&mut self, pin: &str) -> VaultResult<()> {
        let Some(blob) = self.saved_blob.clone() else {
            return Err(VaultError::NothingToUnlock);
        };
        if !self.is_locked() {
            return Err(VaultError::NotLocked);
        }

        let now = self.now();
        if let Some(until) = self.locked_until {
            if now < until {
                let err = VaultError::LockedOut(remaining_seconds(until - now));
                self.unlock_error = Some(err.to_string());
                return Err(err);
            }
            self.locked_until = None;
        }

        match crypto::decrypt(blob, SecretString::new(pin.to_string())).await {
            // An empty key cannot come from a save; treat it like a bad PIN
            Ok(secret) if secret.expose_secret().is_empty() => {
                Err(self.register_failed_attempt())
            }
            Ok(secret) => {
                self.phase = Phase::Unlocked(secret);
                self.unlock_attempts = 0;
                self.locked_until = None;
                self.unlock_error = None;
                self.pin = empty_secret();
                info!("Vault unlocked");
                self.sync_guard();
                Ok(())
            }
            Err(e) if e.is_decrypt_failure() => Err(self.register_failed_attempt()),
            Err(e) => {
                error!("Unlock could not run: {}", e);
                Err(e)
            }
        }
    }

    fn register_failed_attempt(&mut self) -> VaultError {
        self.unlock_attempts += 1;
        let max = self.config.max_unlock_attempts;

        let err = if self.unlock_attempts >= max {
            self.locked_until = Some(self.now() + self.config.lockout_duration());
            self.unlock_attempts = 0;
            warn!(
                "Too many failed unlock attempts - locked out for {} seconds",
                self.config.lockout_duration_seconds
            );
            VaultError::LockedOut(self.config.lockout_duration_seconds)
        } else {
            warn!("Failed unlock attempt {}/{}", self.unlock_attempts, max);
            VaultError::InvalidPin {
                attempt: self.unlock_attempts,
                max,
            }
        };

        self.unlock_error = Some(err.to_string());
        err
    }

    /// Forget the saved blob and PIN so the key can be saved under a new PIN.
    /// The in-memory key is untouched.
    pub fn reset_pin(&mut self) -> VaultResult<()> {
        self.store.delete(storage_keys::API_KEY_ENCRYPTED)?;
        self.saved_blob = None;
        self.pin = empty_secret();
        if self.is_locked() {
            // Nothing left to unlock with
            self.phase = Phase::Empty;
        }
        info!("PIN reset - saved API key removed");
        self.sync_guard();
        Ok(())
    }

    /// Drop everything: saved blob, key, PIN and the remember choice
    pub fn clear_all(&mut self) -> VaultResult<()> {
        self.store.delete(storage_keys::API_KEY_ENCRYPTED)?;
        self.saved_blob = None;
        self.phase = Phase::Empty;
        self.pin = empty_secret();
        self.remember = false;
        self.unlock_attempts = 0;
        self.locked_until = None;
        self.unlock_error = None;
        self.persist_timer.cancel();
        info!("Vault cleared");
        self.sync_guard();
        Ok(())
    }

    /// Drop the key and PIN from memory, keeping the saved blob.
    /// Returns false when there is no blob to unlock with later.
    pub fn lock(&mut self) -> bool {
        if self.saved_blob.is_none() {
            return false;
        }
        if let Phase::Unlocked(_) = self.phase {
            self.phase = Phase::Locked;
            self.pin = empty_secret();
            self.persist_timer.cancel();
            self.sync_guard();
        }
        self.is_locked()
    }

    /// Feed a user-activity signal to the inactivity guard
    pub fn record_activity(&mut self, event: ActivityEvent) -> bool {
        let now = self.now();
        self.guard.record_activity(event, now)
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.persist_timer.deadline(), self.guard.deadline())
    }

    /// Run whatever timers are due
    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.now();

        if self.guard.poll(now) {
            if self.lock() {
                info!("Vault locked after inactivity");
                return TickOutcome::SessionLocked;
            }
            self.sync_guard();
        }

        if self.persist_timer.fire_if_due(now) {
            return self.run_persist().await;
        }

        TickOutcome::Idle
    }

    /// Run a pending debounced write now instead of waiting for it
    pub async fn flush(&mut self) -> TickOutcome {
        if !self.persist_timer.is_armed() {
            return TickOutcome::Idle;
        }
        self.persist_timer.cancel();
        self.run_persist().await
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.active.clone())
    }

    /// Stop all timers; any write still in flight is discarded
    pub fn shutdown(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.persist_timer.cancel();
        let now = self.now();
        self.guard.sync(false, now);
    }

    fn sync_guard(&mut self) {
        let exposed = self.is_active()
            && matches!(self.phase, Phase::Unlocked(_))
            && self.saved_blob.is_some();
        let now = self.now();
        self.guard.sync(exposed, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{ManualClock, MemoryStore};

    const PIN: &str = "1234";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn vault_with(
        store: &MemoryStore,
        config: VaultConfig,
    ) -> (CredentialVault<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let vault = CredentialVault::new(store.clone(), clock.clone(), config);
        (vault, clock)
    }

    fn vault(store: &MemoryStore) -> (CredentialVault<MemoryStore>, Arc<ManualClock>) {
        vault_with(store, VaultConfig::default())
    }

    fn store_with_blob(secret: &str, pin: &str) -> MemoryStore {
        let blob = crypto::seal(secret, pin).unwrap();
        MemoryStore::with_entries([(storage_keys::API_KEY_ENCRYPTED, blob.into_string())])
    }

    fn saved(store: &MemoryStore) -> Option<String> {
        store.get(storage_keys::API_KEY_ENCRYPTED).unwrap()
    }

    fn exposed(vault: &CredentialVault<MemoryStore>) -> Option<String> {
        vault.secret().map(|s| s.expose_secret().clone())
    }

    #[test]
    fn test_initialize_empty() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);

        assert_eq!(vault.initialize().unwrap(), InitOutcome::Empty);
        assert_eq!(vault.status().phase, VaultPhase::Empty);
        assert!(!vault.status().remember);
    }

    #[test]
    fn test_initialize_with_saved_key_locks() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);

        assert_eq!(vault.initialize().unwrap(), InitOutcome::Locked);
        let status = vault.status();
        assert_eq!(status.phase, VaultPhase::Locked);
        assert!(status.remember);
        assert!(status.has_saved_key);
        assert!(vault.secret().is_none());
    }

    #[test]
    fn test_legacy_key_is_consumed_once() {
        let store = MemoryStore::with_entries([(storage_keys::API_KEY_LEGACY, "plain-key")]);
        let (mut vault, _) = vault(&store);

        assert_eq!(vault.initialize().unwrap(), InitOutcome::MigratedLegacy);
        assert_eq!(exposed(&vault).as_deref(), Some("plain-key"));
        assert_eq!(store.get(storage_keys::API_KEY_LEGACY).unwrap(), None);
        assert_eq!(saved(&store), None);

        assert_eq!(vault.initialize().unwrap(), InitOutcome::AlreadyInitialized);
    }

    #[test]
    fn test_saved_key_wins_over_legacy() {
        let store = store_with_blob("api-key", PIN);
        store.set(storage_keys::API_KEY_LEGACY, "old-plain-key").unwrap();
        let (mut vault, _) = vault(&store);

        assert_eq!(vault.initialize().unwrap(), InitOutcome::Locked);
        assert_eq!(store.get(storage_keys::API_KEY_LEGACY).unwrap(), None);
        assert!(vault.secret().is_none());
    }

    #[tokio::test]
    async fn test_unlock_success_clears_pin() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();
        vault.set_pin(PIN);

        vault.unlock(PIN).await.unwrap();

        let status = vault.status();
        assert_eq!(status.phase, VaultPhase::Unlocked);
        assert!(!status.pin_entered);
        assert_eq!(status.unlock_attempts, 0);
        assert_eq!(status.unlock_error, None);
        assert!(status.session_guard_active);
        assert_eq!(exposed(&vault).as_deref(), Some("api-key"));
    }

    #[tokio::test]
    async fn test_wrong_pin_counts_attempts() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        let err = vault.unlock("0000").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPin { attempt: 1, max: 5 }));
        assert_eq!(vault.status().unlock_error.as_deref(), Some("Invalid PIN (1/5)"));

        let err = vault.unlock("0001").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPin { attempt: 2, max: 5 }));
        assert_eq!(vault.status().phase, VaultPhase::Locked);
    }

    #[tokio::test]
    async fn test_lockout_after_max_attempts() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, clock) = vault(&store);
        vault.initialize().unwrap();

        for _ in 0..4 {
            assert!(matches!(
                vault.unlock("0000").await,
                Err(VaultError::InvalidPin { .. })
            ));
        }
        assert!(matches!(vault.unlock("0000").await, Err(VaultError::LockedOut(30))));
        assert_eq!(vault.status().unlock_attempts, 0);

        // Even the right PIN is refused without decrypting
        clock.advance(Duration::from_secs(10));
        assert!(matches!(vault.unlock(PIN).await, Err(VaultError::LockedOut(20))));
        assert_eq!(vault.status().lockout_remaining_seconds, 20);

        clock.advance(Duration::from_secs(20));
        let err = vault.unlock("0000").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPin { attempt: 1, max: 5 }));

        vault.unlock(PIN).await.unwrap();
        assert_eq!(vault.status().unlock_attempts, 0);
    }

    #[tokio::test]
    async fn test_malformed_blob_looks_like_wrong_pin() {
        let store =
            MemoryStore::with_entries([(storage_keys::API_KEY_ENCRYPTED, "not-valid-base64!!!")]);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        let err = vault.unlock(PIN).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPin { attempt: 1, max: 5 }));
    }

    #[tokio::test]
    async fn test_empty_saved_key_is_a_failed_unlock() {
        let store = store_with_blob("", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        let err = vault.unlock(PIN).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPin { attempt: 1, max: 5 }));

        let status = vault.status();
        assert_eq!(status.phase, VaultPhase::Locked);
        assert!(status.has_saved_key);
        assert_eq!(status.unlock_attempts, 1);
        assert!(vault.secret().is_none());
    }

    #[tokio::test]
    async fn test_lockout_skips_key_derivation() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();
        for _ in 0..5 {
            assert!(vault.unlock("0000").await.is_err());
        }

        let started = std::time::Instant::now();
        let salt = [0u8; vault_core::SALT_SIZE];
        std::hint::black_box(vault_core::DerivedKey::derive(PIN.as_bytes(), &salt));
        let one_derivation = started.elapsed();

        let started = std::time::Instant::now();
        assert!(matches!(vault.unlock(PIN).await, Err(VaultError::LockedOut(_))));
        assert!(started.elapsed() < one_derivation / 2);
    }

    #[tokio::test]
    async fn test_unlock_requires_saved_key() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        assert!(matches!(vault.unlock(PIN).await, Err(VaultError::NothingToUnlock)));
    }

    #[tokio::test]
    async fn test_debounced_persist() {
        let store = MemoryStore::new();
        let (mut vault, clock) = vault(&store);
        vault.initialize().unwrap();

        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);

        clock.advance(ms(299));
        assert_eq!(vault.tick().await, TickOutcome::Idle);
        assert_eq!(saved(&store), None);

        clock.advance(ms(1));
        assert_eq!(vault.tick().await, TickOutcome::Persisted);

        let blob = EncryptedBlob::from_encoded(saved(&store).unwrap());
        assert_eq!(crypto::open(&blob, PIN).unwrap().expose_secret(), "api-key");
        assert!(vault.status().session_guard_active);
    }

    #[tokio::test]
    async fn test_debounce_resets_on_each_edit() {
        let store = MemoryStore::new();
        let (mut vault, clock) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_pin(PIN);
        vault.set_secret("api-k").unwrap();

        clock.advance(ms(200));
        vault.set_secret("api-key").unwrap();

        clock.advance(ms(200));
        assert_eq!(vault.tick().await, TickOutcome::Idle);

        clock.advance(ms(100));
        assert_eq!(vault.tick().await, TickOutcome::Persisted);

        let blob = EncryptedBlob::from_encoded(saved(&store).unwrap());
        assert_eq!(crypto::open(&blob, PIN).unwrap().expose_secret(), "api-key");
    }

    #[tokio::test]
    async fn test_same_key_and_pin_is_not_rewritten() {
        let store = MemoryStore::new();
        let (mut vault, clock) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);
        assert_eq!(vault.flush().await, TickOutcome::Persisted);
        let first = saved(&store);

        vault.set_pin(PIN);
        vault.set_secret("api-key").unwrap();
        clock.advance(ms(300));
        assert_eq!(vault.tick().await, TickOutcome::PersistSkipped);
        assert_eq!(saved(&store), first);
    }

    #[tokio::test]
    async fn test_pin_change_reencrypts() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);
        vault.flush().await;

        vault.set_pin("98765");
        assert_eq!(vault.flush().await, TickOutcome::Persisted);

        let blob = EncryptedBlob::from_encoded(saved(&store).unwrap());
        assert!(crypto::open(&blob, PIN).is_err());
        assert_eq!(crypto::open(&blob, "98765").unwrap().expose_secret(), "api-key");
    }

    #[tokio::test]
    async fn test_short_pin_does_not_persist() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin("123");

        assert_eq!(vault.flush().await, TickOutcome::Idle);
        assert_eq!(saved(&store), None);
    }

    #[tokio::test]
    async fn test_remember_off_deletes_saved_key() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);
        vault.flush().await;
        assert!(saved(&store).is_some());

        vault.set_remember(false).unwrap();
        assert_eq!(saved(&store), None);
        assert!(!vault.status().has_saved_key);
        assert!(!vault.status().session_guard_active);
        assert_eq!(exposed(&vault).as_deref(), Some("api-key"));
    }

    #[tokio::test]
    async fn test_edits_rejected_while_locked() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        assert!(matches!(vault.set_secret("other"), Err(VaultError::VaultLocked)));
        assert!(matches!(vault.set_remember(false), Err(VaultError::VaultLocked)));
        assert_eq!(vault.status().phase, VaultPhase::Locked);
        assert!(saved(&store).is_some());
    }

    #[tokio::test]
    async fn test_shutdown_drops_pending_write() {
        let store = MemoryStore::new();
        let (mut vault, clock) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);

        let signal = vault.shutdown_signal();
        signal.trigger();
        assert!(signal.is_triggered());

        clock.advance(ms(300));
        assert_eq!(vault.tick().await, TickOutcome::Idle);
        assert_eq!(saved(&store), None);
    }

    #[tokio::test]
    async fn test_reset_pin_keeps_key() {
        let store = MemoryStore::new();
        let (mut vault, _) = vault(&store);
        vault.set_remember(true).unwrap();
        vault.set_secret("api-key").unwrap();
        vault.set_pin(PIN);
        vault.flush().await;

        vault.reset_pin().unwrap();

        assert_eq!(saved(&store), None);
        let status = vault.status();
        assert!(!status.pin_entered);
        assert!(status.remember);
        assert_eq!(exposed(&vault).as_deref(), Some("api-key"));
    }

    #[test]
    fn test_reset_pin_while_locked_empties() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();

        vault.reset_pin().unwrap();
        assert_eq!(vault.status().phase, VaultPhase::Empty);
        assert_eq!(saved(&store), None);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();
        vault.unlock(PIN).await.unwrap();

        vault.clear_all().unwrap();

        let status = vault.status();
        assert_eq!(status.phase, VaultPhase::Empty);
        assert!(!status.remember);
        assert!(!status.has_saved_key);
        assert!(!status.session_guard_active);
        assert_eq!(saved(&store), None);
        assert!(vault.secret().is_none());

        vault.set_secret("new-key").unwrap();
        assert_eq!(vault.status().phase, VaultPhase::Unlocked);
    }

    #[tokio::test]
    async fn test_clear_all_ends_lockout() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, _) = vault(&store);
        vault.initialize().unwrap();
        for _ in 0..5 {
            assert!(vault.unlock("0000").await.is_err());
        }
        assert_eq!(vault.status().lockout_remaining_seconds, 30);

        vault.clear_all().unwrap();
        assert_eq!(vault.status().lockout_remaining_seconds, 0);

        vault.set_remember(true).unwrap();
        vault.set_secret("new-key").unwrap();
        vault.set_pin("5678");
        assert_eq!(vault.flush().await, TickOutcome::Persisted);
        assert!(vault.lock());

        vault.unlock("5678").await.unwrap();
        assert_eq!(exposed(&vault).as_deref(), Some("new-key"));
    }

    fn short_session() -> VaultConfig {
        VaultConfig {
            session_timeout_seconds: 1,
            ..VaultConfig::default()
        }
    }

    #[tokio::test]
    async fn test_inactivity_locks_and_keeps_blob() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, clock) = vault_with(&store, short_session());
        vault.initialize().unwrap();
        vault.unlock(PIN).await.unwrap();
        let blob = saved(&store);

        clock.advance(ms(999));
        assert_eq!(vault.tick().await, TickOutcome::Idle);

        clock.advance(ms(1));
        assert_eq!(vault.tick().await, TickOutcome::SessionLocked);
        assert_eq!(vault.status().phase, VaultPhase::Locked);
        assert!(vault.secret().is_none());
        assert_eq!(vault.next_deadline(), None);
        assert_eq!(saved(&store), blob);

        vault.unlock(PIN).await.unwrap();
        assert_eq!(exposed(&vault).as_deref(), Some("api-key"));
    }

    #[tokio::test]
    async fn test_activity_postpones_lock() {
        let store = store_with_blob("api-key", PIN);
        let (mut vault, clock) = vault_with(&store, short_session());
        vault.initialize().unwrap();
        vault.unlock(PIN).await.unwrap();

        clock.advance(ms(800));
        assert!(vault.record_activity(ActivityEvent::PointerDown));

        clock.advance(ms(800));
        assert_eq!(vault.tick().await, TickOutcome::Idle);
        assert_eq!(vault.status().phase, VaultPhase::Unlocked);

        clock.advance(ms(200));
        assert_eq!(vault.tick().await, TickOutcome::SessionLocked);
    }

    #[tokio::test]
    async fn test_guard_inert_without_saved_key() {
        let store = MemoryStore::new();
        let (mut vault, clock) = vault_with(&store, short_session());
        vault.set_secret("api-key").unwrap();

        assert!(!vault.status().session_guard_active);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(vault.tick().await, TickOutcome::Idle);
        assert_eq!(vault.next_deadline(), None);
        assert_eq!(exposed(&vault).as_deref(), Some("api-key"));
    }
}
