//! RSA private keys loaded once at startup and looked up by fingerprint.
//!
//! Keys are held newest first: index 0 is used for every new encryption,
//! older keys stay available so existing envelopes can still be opened.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::{CryptoError, CryptoResult};
use crate::storage::{self, Storage};

/// Number of hex characters kept from the SHA-256 digest of a key file
pub const FINGERPRINT_LEN: usize = 16;

/// First 16 uppercase hex characters of SHA-256 over the raw key bytes
pub fn fingerprint(raw: &[u8]) -> String {
    let digest = hex::encode_upper(Sha256::digest(raw));
    digest[..FINGERPRINT_LEN].to_string()
}

/// True if `value` has the shape of a fingerprint
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

/// Generate a new RSA private key encoded as PKCS#8 PEM
pub fn generate_private_key_pem(bits: usize) -> CryptoResult<String> {
    let key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::Configuration(format!("key generation failed: {}", e)))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Configuration(format!("key encoding failed: {}", e)))?;
    Ok(pem.to_string())
}

pub struct PrivateKey {
    fingerprint: String,
    key: RsaPrivateKey,
    public: RsaPublicKey,
    created_at: DateTime<Utc>,
}

impl PrivateKey {
    /// Parse a PKCS#8 or PKCS#1 PEM key. `name` is only used in error messages.
    pub fn from_pem(name: &str, raw: &[u8], created_at: DateTime<Utc>) -> CryptoResult<Self> {
        let invalid = |reason: String| CryptoError::InvalidKey {
            name: name.to_string(),
            reason,
        };

        let pem = std::str::from_utf8(raw).map_err(|_| invalid("not valid UTF-8 PEM".to_string()))?;
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| invalid(e.to_string()))?;
        let public = key.to_public_key();

        Ok(Self {
            fingerprint: fingerprint(raw),
            key,
            public,
            created_at,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("fingerprint", &self.fingerprint)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct Keychain {
    keys: Vec<PrivateKey>,
}

impl Keychain {
    /// Load every `*{suffix}` file directly under `dir`.
    ///
    /// Fails with `Configuration` when no key is found: the process must not
    /// start without one.
    pub async fn load(storage: &dyn Storage, dir: &str, suffix: &str) -> CryptoResult<Self> {
        let mut entries: Vec<_> = storage
            .ls(dir)
            .await?
            .into_iter()
            .filter(|entry| entry.name.ends_with(suffix))
            .collect();

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));

        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let raw = storage.open(&storage::join(dir, &entry.name)).await?;
            let key = PrivateKey::from_pem(&entry.name, &raw, entry.modified)?;
            debug!("Loaded private key {} ({})", key.fingerprint(), entry.name);
            keys.push(key);
        }

        let keychain = Self::from_keys(keys).map_err(|_| {
            CryptoError::Configuration(format!("no private keys matching '*{}' found in '{}'", suffix, dir))
        })?;
        info!(
            "Keychain loaded {} key(s), current fingerprint {}",
            keychain.len(),
            keychain.current().fingerprint()
        );
        Ok(keychain)
    }

    /// Build a keychain from already parsed keys, ordering them newest first
    pub fn from_keys(mut keys: Vec<PrivateKey>) -> CryptoResult<Self> {
        if keys.is_empty() {
            return Err(CryptoError::Configuration("no private keys available".to_string()));
        }
        // Stable sort keeps the load order for equal timestamps before reversing
        keys.sort_by_key(|k| k.created_at);
        keys.reverse();
        Ok(Self { keys })
    }

    /// The newest key, used for all new encryption
    pub fn current(&self) -> &PrivateKey {
        &self.keys[0]
    }

    pub fn find(&self, fingerprint: &str) -> CryptoResult<&PrivateKey> {
        self.keys
            .iter()
            .find(|k| k.fingerprint == fingerprint)
            .ok_or_else(|| CryptoError::KeyNotFound(fingerprint.to_string()))
    }

    pub fn keys(&self) -> &[PrivateKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
