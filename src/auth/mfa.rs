//! TOTP enrolment and backup codes.
//!
//! The base32 TOTP secret and the comma-joined backup-code batch are stored
//! sealed with the keychain's current key, like personal fields.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, error};

use super::AuthError;
use crate::config::SecurityConfig;
use crate::crypto::{CryptoError, CryptoService};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// No 0/O or 1/I so codes survive being read aloud
const BACKUP_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Everything produced by [`MfaService::setup`]
#[derive(Debug, Clone)]
pub struct MfaSetup {
    pub sealed_secret: String,
    pub provisioning_uri: String,
    /// Shown to the user once, never stored in the clear
    pub backup_codes: Vec<String>,
    pub sealed_backup_codes: String,
}

pub struct MfaService {
    crypto: Arc<CryptoService>,
    issuer: String,
    leeway_steps: u8,
    backup_code_count: usize,
    backup_code_length: usize,
}

impl MfaService {
    pub fn new(crypto: Arc<CryptoService>, security: &SecurityConfig) -> Self {
        Self {
            crypto,
            issuer: security.totp_issuer.clone(),
            leeway_steps: security.totp_leeway_steps,
            backup_code_count: security.backup_code_count,
            backup_code_length: security.backup_code_length,
        }
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> Result<TOTP, AuthError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            self.leeway_steps,
            TOTP_STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| {
            error!("TOTP construction failed: {:?}", e);
            AuthError::Crypto(CryptoError::Configuration("invalid TOTP parameters".to_string()))
        })
    }

    fn unsealed_totp(&self, sealed_secret: &str) -> Result<TOTP, AuthError> {
        let encoded = self.crypto.unseal_string(sealed_secret)?;
        let secret = Secret::Encoded(encoded)
            .to_bytes()
            .map_err(|_| AuthError::Crypto(CryptoError::Decryption("stored TOTP secret is not base32".to_string())))?;
        self.totp(secret, "account")
    }

    /// New secret, provisioning URI and backup-code batch for `account`
    pub fn setup(&self, account: &str) -> Result<MfaSetup, AuthError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|_| AuthError::Crypto(CryptoError::Encryption("secret generation failed".to_string())))?;
        let totp = self.totp(secret_bytes, account)?;

        let backup_codes = self.generate_backup_codes();
        let sealed_backup_codes = self.crypto.seal(backup_codes.join(",").as_bytes())?;

        Ok(MfaSetup {
            sealed_secret: self.crypto.seal(totp.get_secret_base32().as_bytes())?,
            provisioning_uri: totp.get_url(),
            backup_codes,
            sealed_backup_codes,
        })
    }

    pub fn verify_totp(&self, sealed_secret: &str, code: &str) -> Result<bool, AuthError> {
        let totp = self.unsealed_totp(sealed_secret)?;
        totp.check_current(code.trim()).map_err(|e| {
            error!("system clock error during TOTP check: {}", e);
            AuthError::TotpInvalid
        })
    }

    /// First code after setup; MFA is switched on only if this passes
    pub fn confirm(&self, sealed_secret: &str, code: &str) -> Result<(), AuthError> {
        if self.verify_totp(sealed_secret, code)? {
            Ok(())
        } else {
            Err(AuthError::TotpInvalid)
        }
    }

    /// The code an authenticator app would show right now
    pub fn current_code(&self, sealed_secret: &str) -> Result<String, AuthError> {
        self.unsealed_totp(sealed_secret)?
            .generate_current()
            .map_err(|_| AuthError::TotpInvalid)
    }

    fn generate_backup_codes(&self) -> Vec<String> {
        let mut rng = OsRng;
        (0..self.backup_code_count)
            .map(|_| {
                (0..self.backup_code_length)
                    .map(|_| BACKUP_CODE_ALPHABET[rng.gen_range(0..BACKUP_CODE_ALPHABET.len())] as char)
                    .collect()
            })
            .collect()
    }

    fn unseal_backup_codes(&self, sealed: &str) -> Result<Vec<String>, AuthError> {
        Ok(self
            .crypto
            .unseal_string(sealed)?
            .split(',')
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn verify_backup_code(&self, sealed: &str, code: &str) -> Result<bool, AuthError> {
        let code = normalize_backup_code(code);
        Ok(self.unseal_backup_codes(sealed)?.iter().any(|c| *c == code))
    }

    /// On a match, returns the batch without `code`, sealed again
    pub fn consume_backup_code(&self, sealed: &str, code: &str) -> Result<Option<String>, AuthError> {
        let code = normalize_backup_code(code);
        let mut codes = self.unseal_backup_codes(sealed)?;
        let Some(position) = codes.iter().position(|c| *c == code) else {
            return Ok(None);
        };
        codes.remove(position);
        debug!("backup code consumed, {} remaining", codes.len());
        Ok(Some(self.crypto.seal(codes.join(",").as_bytes())?))
    }
}

fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing;

    fn service() -> MfaService {
        MfaService::new(Arc::new(testing::crypto(&[0])), &AppConfig::testing().security)
    }

    #[test]
    fn setup_produces_sealed_material() {
        let mfa = service();
        let setup = mfa.setup("alice@example.com").unwrap();

        assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(setup.provisioning_uri.contains("issuer=Casework"));
        assert_eq!(setup.backup_codes.len(), 10);
        assert!(setup.backup_codes.iter().all(|c| c.len() == 8));
        assert!(crate::crypto::Envelope::is_sealed(&setup.sealed_secret));
        assert!(!setup.sealed_backup_codes.contains(&setup.backup_codes[0]));
    }

    #[test]
    fn current_code_confirms() {
        let mfa = service();
        let setup = mfa.setup("alice@example.com").unwrap();
        let code = mfa.current_code(&setup.sealed_secret).unwrap();

        assert!(mfa.confirm(&setup.sealed_secret, &code).is_ok());
        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(mfa.confirm(&setup.sealed_secret, wrong), Err(AuthError::TotpInvalid)));
    }

    #[test]
    fn backup_codes_are_single_use() {
        let mfa = service();
        let setup = mfa.setup("alice@example.com").unwrap();
        let code = setup.backup_codes[3].clone();

        assert!(mfa.verify_backup_code(&setup.sealed_backup_codes, &code.to_lowercase()).unwrap());
        let remaining = mfa
            .consume_backup_code(&setup.sealed_backup_codes, &code)
            .unwrap()
            .expect("code should match");

        assert!(!mfa.verify_backup_code(&remaining, &code).unwrap());
        assert!(mfa.verify_backup_code(&remaining, &setup.backup_codes[0]).unwrap());
        assert_eq!(mfa.consume_backup_code(&remaining, &code).unwrap(), None);
    }

    #[test]
    fn last_backup_code_leaves_an_empty_batch() {
        let mut security = AppConfig::testing().security;
        security.backup_code_count = 1;
        let mfa = MfaService::new(Arc::new(testing::crypto(&[0])), &security);
        let setup = mfa.setup("bob@example.com").unwrap();

        let remaining = mfa
            .consume_backup_code(&setup.sealed_backup_codes, &setup.backup_codes[0])
            .unwrap()
            .unwrap();
        assert!(!mfa.verify_backup_code(&remaining, &setup.backup_codes[0]).unwrap());
    }
}
