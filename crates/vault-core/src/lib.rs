//! Vault Core - building blocks for the figlab API-key vault
//!
//! This crate provides:
//! - PBKDF2 + AES-256-GCM encryption of the API key under a PIN
//! - Key-value storage adapters (in-memory and JSON file)
//! - An injectable clock and single-shot timers
//! - Figma node-id normalization and payload helpers
//! - Credential redaction and a persisted error report log

pub mod clock;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod models;
pub mod node_id;
pub mod payload;
pub mod report;
pub mod storage;

pub use clock::*;
pub use crypto::*;
pub use error::*;
pub use filter::*;
pub use models::*;
pub use node_id::*;
pub use payload::*;
pub use report::*;
pub use storage::*;
