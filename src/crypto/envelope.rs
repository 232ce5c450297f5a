//! `<fingerprint>:<base64 ciphertext>` strings persisted next to sealed data

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::error::{CryptoError, CryptoResult};
use super::keychain::is_fingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub fingerprint: String,
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn new(fingerprint: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ciphertext,
        }
    }

    /// Split on the first `:` and decode the ciphertext
    pub fn parse(value: &str) -> CryptoResult<Self> {
        let (fingerprint, encoded) = value
            .split_once(':')
            .ok_or_else(|| CryptoError::Decryption("value is not a sealed envelope".to_string()))?;

        if !is_fingerprint(fingerprint) {
            return Err(CryptoError::Decryption("envelope has a malformed key fingerprint".to_string()));
        }

        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::Decryption("envelope ciphertext is not valid base64".to_string()))?;

        Ok(Self::new(fingerprint, ciphertext))
    }

    /// Tells sealed values from legacy plaintext: a fingerprint prefix and a
    /// non-empty base64 payload
    pub fn is_sealed(value: &str) -> bool {
        match value.split_once(':') {
            Some((fingerprint, encoded)) => {
                is_fingerprint(fingerprint) && !encoded.is_empty() && STANDARD.decode(encoded).is_ok()
            }
            None => false,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fingerprint, STANDARD.encode(&self.ciphertext))
    }
}
