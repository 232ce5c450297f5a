//! Shared fixtures for unit tests

use std::sync::{Arc, OnceLock};

use chrono::{Duration, TimeZone, Utc};

use crate::crypto::{generate_private_key_pem, CryptoService, Keychain, PrivateKey};
use crate::database::models::User;
use crate::permissions::Role;
use crate::secrets::SecretsService;

const KEY_COUNT: usize = 3;

static KEYS: OnceLock<Vec<String>> = OnceLock::new();

/// One of three 2048-bit PKCS#8 PEM keys, generated once per test binary
pub fn key_pem(index: usize) -> &'static str {
    let keys = KEYS.get_or_init(|| {
        (0..KEY_COUNT)
            .map(|_| generate_private_key_pem(2048).expect("generate test key"))
            .collect()
    });
    &keys[index]
}

/// Keychain holding the given keys. A later index is a newer key, so the
/// largest index is current.
pub fn keychain(indices: &[usize]) -> Keychain {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let keys = indices
        .iter()
        .map(|&i| {
            let created = base + Duration::days(i as i64);
            PrivateKey::from_pem(&format!("{}.pem", i), key_pem(i).as_bytes(), created).unwrap()
        })
        .collect();
    Keychain::from_keys(keys).unwrap()
}

pub fn crypto(indices: &[usize]) -> CryptoService {
    CryptoService::new(Arc::new(keychain(indices)))
}

pub fn secrets(indices: &[usize]) -> SecretsService {
    SecretsService::new(Arc::new(crypto(indices)))
}

pub fn user(role: Role) -> User {
    User::new(format!("{}@example.com", role), "not-a-hash", role)
}
