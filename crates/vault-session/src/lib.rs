//! Vault Session - the stateful side of the figlab credential vault
//!
//! - [`CredentialVault`]: lock/unlock state machine with PIN lockout and
//!   debounced encrypted persistence
//! - [`SessionGuard`]: inactivity timeout that re-locks an exposed key
//! - [`spawn_vault`]: runs a vault on its own task behind a [`VaultHandle`]

pub mod driver;
pub mod guard;
pub mod vault;

pub use driver::{spawn_vault, VaultHandle};
pub use guard::{ActivityEvent, SessionGuard};
pub use vault::{
    CredentialVault, InitOutcome, ShutdownSignal, TickOutcome, VaultPhase, VaultStatus,
};
