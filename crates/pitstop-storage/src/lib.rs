//! Credential persistence for Pitstop.
//!
//! Two layers live here:
//! - **Backends** implementing [`KeyValueStore`]: [`FileStore`] (durable JSON
//!   document) and [`MemoryStore`] (tests, ephemeral sessions).
//! - **[`CredentialStore`]**: the single owner of the stored credential
//!   record, with whole-record writes and change notifications.

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{
    ClearReason, CredentialChange, CredentialStore, StoredCredentials, UserProfile,
};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
