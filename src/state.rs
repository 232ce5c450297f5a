use std::sync::Arc;

use crate::auth::{AuthError, AuthService, MfaService, TokenService};
use crate::config::AppConfig;
use crate::crypto::{CryptoService, Keychain};
use crate::database::Stores;
use crate::secrets::SecretsService;
use crate::storage::Storage;
use crate::uploads::UploadHandler;

/// Services shared by every request. Built once in `main` (or a test) from an
/// already loaded keychain; nothing here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub crypto: Arc<CryptoService>,
    pub secrets: Arc<SecretsService>,
    pub uploads: Arc<UploadHandler>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        keychain: Keychain,
        storage: Arc<dyn Storage>,
        stores: Stores,
    ) -> Result<Self, AuthError> {
        let crypto = Arc::new(CryptoService::new(Arc::new(keychain)));
        let tokens = TokenService::new(crypto.keychain(), &config.security)?;
        let mfa = MfaService::new(crypto.clone(), &config.security);
        let auth = AuthService::new(&config.security, tokens, mfa)?;

        Ok(Self {
            secrets: Arc::new(SecretsService::new(crypto.clone())),
            uploads: Arc::new(UploadHandler::new(crypto.clone(), storage, &config.uploads)),
            auth: Arc::new(auth),
            crypto,
            stores,
            config: Arc::new(config),
        })
    }
}
