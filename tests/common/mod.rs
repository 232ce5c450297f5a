#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, TimeZone, Utc};

use casework_api::config::AppConfig;
use casework_api::crypto::{generate_private_key_pem, CryptoService, Keychain, PrivateKey};
use casework_api::database::models::User;
use casework_api::database::Stores;
use casework_api::permissions::Role;
use casework_api::secrets::SecretsService;
use casework_api::storage::MemoryStorage;
use casework_api::AppState;

pub const PASSWORD: &str = "Corr3ctHorse";

static KEYS: OnceLock<Vec<String>> = OnceLock::new();

/// Three 2048-bit PEM keys shared by every test in the binary
pub fn key_pem(index: usize) -> &'static str {
    let keys = KEYS.get_or_init(|| {
        (0..3)
            .map(|_| generate_private_key_pem(2048).expect("generate test key"))
            .collect()
    });
    &keys[index]
}

/// Creation time used for key `index`; higher index means newer
pub fn key_time(index: usize) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::days(index as i64)
}

pub fn keychain(indices: &[usize]) -> Keychain {
    let keys = indices
        .iter()
        .map(|&i| PrivateKey::from_pem(&format!("{}.pem", i), key_pem(i).as_bytes(), key_time(i)).unwrap())
        .collect();
    Keychain::from_keys(keys).unwrap()
}

pub fn crypto(indices: &[usize]) -> Arc<CryptoService> {
    Arc::new(CryptoService::new(Arc::new(keychain(indices))))
}

pub fn secrets(indices: &[usize]) -> SecretsService {
    SecretsService::new(crypto(indices))
}

/// Storage with the given keys written under `keys/`
pub fn storage_with_keys(indices: &[usize]) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    for &i in indices {
        storage.insert_with_time(&format!("keys/{}.pem", i), key_pem(i).as_bytes(), key_time(i));
    }
    storage
}

/// App state over memory stores and memory storage, signed with key 0
pub fn app_state() -> AppState {
    AppState::new(
        AppConfig::testing(),
        keychain(&[0]),
        Arc::new(MemoryStorage::new()),
        Stores::memory(),
    )
    .expect("build app state")
}

/// Register and store a user with [`PASSWORD`]
pub async fn create_user(state: &AppState, email: &str, role: Role) -> User {
    let user = state.auth.register(email, PASSWORD, role).expect("register user");
    state.stores.users.insert(&user).await.expect("insert user");
    user
}

pub fn access_token(state: &AppState, user: &User) -> String {
    state
        .auth
        .tokens()
        .issue_pair(user.reference_id)
        .expect("issue tokens")
        .access_token
}
