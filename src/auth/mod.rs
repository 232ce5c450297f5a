//! Password login, MFA and token issuance.
//!
//! Login state machine: credentials are checked first; with MFA enabled the
//! caller must also present a current TOTP code or an unused backup code.

pub mod mfa;
pub mod password;
pub mod token;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{PasswordPolicy, SecurityConfig};
use crate::crypto::CryptoError;
use crate::database::models::User;
use crate::permissions::Role;

pub use mfa::{MfaService, MfaSetup};
pub use password::{validate_password, PasswordHasher};
pub use token::{Claims, TokenKind, TokenPair, TokenService};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// MFA is enabled and no code was supplied; the client should prompt for one
    #[error("Authentication code required")]
    TotpRequired,

    #[error("Invalid authentication code")]
    TotpInvalid,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password does not meet the policy: {}", .0.join(", "))]
    WeakPassword(Vec<String>),

    #[error("Password hashing failed")]
    Hashing,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginAttempt {
    pub password: String,
    #[serde(default)]
    pub totp: Option<String>,
    #[serde(default)]
    pub backup_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    /// Set when a backup code was used: the re-sealed remaining batch to persist
    pub remaining_backup_codes: Option<String>,
}

pub struct AuthService {
    hasher: PasswordHasher,
    policy: PasswordPolicy,
    tokens: TokenService,
    mfa: MfaService,
    /// Hash of a random password at the configured cost, verified against
    /// when the email has no account so both paths cost one bcrypt check
    decoy_hash: String,
}

impl AuthService {
    pub fn new(security: &SecurityConfig, tokens: TokenService, mfa: MfaService) -> Result<Self, AuthError> {
        let hasher = PasswordHasher::new(security.bcrypt_cost);
        let decoy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            hasher,
            policy: security.password_policy.clone(),
            tokens,
            mfa,
            decoy_hash,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn mfa(&self) -> &MfaService {
        &self.mfa
    }

    /// Validate the password against the policy and build an unsaved user
    pub fn register(&self, email: &str, password: &str, role: Role) -> Result<User, AuthError> {
        validate_password(password, &self.policy)?;
        let hash = self.hasher.hash(password)?;
        Ok(User::new(email.trim(), hash, role))
    }

    /// Login failure for an unknown email, after the same bcrypt work as a
    /// wrong password
    pub fn reject_unknown_account(&self, password: &str) -> AuthError {
        let _ = self.hasher.verify(password, &self.decoy_hash);
        warn!("login rejected: unknown account");
        AuthError::InvalidCredentials
    }

    pub fn login(&self, user: &User, attempt: &LoginAttempt) -> Result<LoginOutcome, AuthError> {
        if !self.hasher.verify(&attempt.password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        let remaining_backup_codes = if user.mfa_enabled {
            self.second_factor(user, attempt)?
        } else {
            None
        };

        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome {
            tokens: self.tokens.issue_pair(user.reference_id)?,
            remaining_backup_codes,
        })
    }

    fn second_factor(&self, user: &User, attempt: &LoginAttempt) -> Result<Option<String>, AuthError> {
        let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        match (present(&attempt.totp), present(&attempt.backup_code)) {
            (Some(code), _) => {
                let secret = user.totp_secret.as_deref().ok_or(AuthError::TotpInvalid)?;
                if self.mfa.verify_totp(secret, &code)? {
                    Ok(None)
                } else {
                    warn!(user_id = %user.id, "login rejected: bad TOTP code");
                    Err(AuthError::TotpInvalid)
                }
            }
            (None, Some(code)) => {
                let batch = user.backup_codes.as_deref().ok_or(AuthError::TotpInvalid)?;
                match self.mfa.consume_backup_code(batch, &code)? {
                    Some(remaining) => Ok(Some(remaining)),
                    None => {
                        warn!(user_id = %user.id, "login rejected: bad backup code");
                        Err(AuthError::TotpInvalid)
                    }
                }
            }
            (None, None) => Err(AuthError::TotpRequired),
        }
    }
}
