use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

use super::envelope::Envelope;
use super::error::{CryptoError, CryptoResult};
use super::keychain::Keychain;

/// RSA-OAEP (SHA-256) for short secrets, keyed by fingerprint so several key
/// generations can coexist.
///
/// Only secrets go through here: the plaintext must fit in one OAEP block
/// (190 bytes for a 2048-bit key). Bulk data uses [`super::aes`].
#[derive(Debug, Clone)]
pub struct CryptoService {
    keychain: Arc<Keychain>,
}

impl CryptoService {
    pub fn new(keychain: Arc<Keychain>) -> Self {
        Self { keychain }
    }

    pub fn keychain(&self) -> &Keychain {
        &self.keychain
    }

    /// Fingerprint of the key used for new encryption
    pub fn current_fingerprint(&self) -> &str {
        self.keychain.current().fingerprint()
    }

    pub fn encrypt(&self, fingerprint: &str, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.keychain.find(fingerprint)?;
        key.public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Fails with `KeyNotFound` for an unknown fingerprint and `Decryption`
    /// for corrupt or foreign ciphertext. Neither is worth retrying.
    pub fn decrypt(&self, fingerprint: &str, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.keychain.find(fingerprint)?;
        key.key()
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::Decryption(format!("ciphertext rejected by key {}", fingerprint)))
    }

    /// Encrypt with the current key and format as `fingerprint:base64`
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let fingerprint = self.current_fingerprint();
        let ciphertext = self.encrypt(fingerprint, plaintext)?;
        Ok(Envelope::new(fingerprint, ciphertext).to_string())
    }

    pub fn unseal(&self, sealed: &str) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::parse(sealed)?;
        self.decrypt(&envelope.fingerprint, &envelope.ciphertext)
    }

    pub fn unseal_string(&self, sealed: &str) -> CryptoResult<String> {
        String::from_utf8(self.unseal(sealed)?)
            .map_err(|_| CryptoError::Decryption("sealed value is not valid UTF-8".to_string()))
    }
}
