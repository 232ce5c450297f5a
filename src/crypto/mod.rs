//! Keychain, RSA sealing of short secrets and AES-GCM for bulk data.
//!
//! Envelope scheme: bulk data is AES-encrypted with a one-time key; that key
//! (with its nonce and tag) is sealed with the long-lived RSA key. Rotating
//! the RSA key never requires re-encrypting bulk data.

pub mod aes;
pub mod envelope;
pub mod error;
pub mod keychain;
pub mod service;

pub use aes::{aes_cipher_options, aes_decrypt, aes_encrypt, format_aes_secrets, parse_aes_secrets, AesCipherOptions};
pub use envelope::Envelope;
pub use error::{CryptoError, CryptoResult};
pub use keychain::{fingerprint, generate_private_key_pem, Keychain, PrivateKey};
pub use service::CryptoService;
