use thiserror::Error;

use crate::storage::StorageError;

/// Failures of the keychain and cryptographic primitives.
///
/// `KeyNotFound` and `Decryption` are permanent for the ciphertext involved:
/// retrying cannot recover a rotated-away key or corrupted data.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Invalid key '{name}': {reason}")]
    InvalidKey { name: String, reason: String },

    #[error("Unsupported AES key size: {0} bits")]
    UnsupportedKeySize(usize),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
