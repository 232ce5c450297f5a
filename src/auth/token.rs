//! RS256 access and refresh tokens signed with the keychain's current key.
//!
//! The header `kid` is the signing key's fingerprint. Verification looks the
//! key up by `kid`, so tokens signed by an older key stay valid until they
//! expire and tokens naming an unknown key are rejected.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use crate::config::SecurityConfig;
use crate::crypto::{CryptoError, Keychain, PrivateKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The user's reference id, never the database key
    pub sub: Uuid,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenService {
    kid: String,
    encoding: EncodingKey,
    decoding: HashMap<String, DecodingKey>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn decoding_key(key: &PrivateKey) -> Result<DecodingKey, AuthError> {
    let public = key.public_key();
    let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());
    DecodingKey::from_rsa_components(&n, &e).map_err(|err| invalid_key(key, err.to_string()))
}

fn invalid_key(key: &PrivateKey, reason: String) -> AuthError {
    AuthError::Crypto(CryptoError::InvalidKey {
        name: key.fingerprint().to_string(),
        reason,
    })
}

impl TokenService {
    pub fn new(keychain: &Keychain, security: &SecurityConfig) -> Result<Self, AuthError> {
        let current = keychain.current();
        let der = current
            .key()
            .to_pkcs1_der()
            .map_err(|e| invalid_key(current, e.to_string()))?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let decoding = keychain
            .keys()
            .iter()
            .map(|key| Ok((key.fingerprint().to_string(), decoding_key(key)?)))
            .collect::<Result<HashMap<_, _>, AuthError>>()?;

        Ok(Self {
            kid: current.fingerprint().to_string(),
            encoding,
            decoding,
            access_ttl: Duration::minutes(security.access_token_minutes),
            refresh_ttl: Duration::hours(security.refresh_token_hours),
        })
    }

    pub fn issue(&self, subject: Uuid, kind: TokenKind) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        self.sign(&Claims {
            sub: subject,
            typ: kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
        })
    }

    pub fn issue_pair(&self, subject: Uuid) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(subject, TokenKind::Access)?,
            refresh_token: self.issue(subject, TokenKind::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding).map_err(|e| invalid_token(e.to_string()))
    }

    /// Verify signature, expiry (no leeway) and token kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| invalid_token(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(invalid_token(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header.kid.ok_or_else(|| invalid_token("missing key id".to_string()))?;
        let key = self
            .decoding
            .get(&kid)
            .ok_or_else(|| invalid_token(format!("unknown signing key {}", kid)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, key, &validation)
            .map_err(|e| invalid_token(e.to_string()))?
            .claims;

        if claims.typ != expected {
            return Err(invalid_token(format!("expected {:?} token", expected)));
        }
        Ok(claims)
    }

    /// Exchange a valid refresh token for a new pair
    pub fn refresh(&self, refresh_token: &str) -> Result<(Claims, TokenPair), AuthError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        let pair = self.issue_pair(claims.sub)?;
        Ok((claims, pair))
    }
}

fn invalid_token(reason: String) -> AuthError {
    debug!("token rejected: {}", reason);
    AuthError::InvalidToken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing;

    fn service(indices: &[usize]) -> TokenService {
        TokenService::new(&testing::keychain(indices), &AppConfig::testing().security).unwrap()
    }

    #[test]
    fn issued_access_token_verifies() {
        let tokens = service(&[0]);
        let subject = Uuid::new_v4();
        let token = tokens.issue(subject, TokenKind::Access).unwrap();

        let claims = tokens.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, subject);
        assert!(claims.exp > claims.iat);

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(testing::keychain(&[0]).current().fingerprint()));
    }

    #[test]
    fn kind_must_match() {
        let tokens = service(&[0]);
        let pair = tokens.issue_pair(Uuid::new_v4()).unwrap();
        assert!(matches!(tokens.verify(&pair.refresh_token, TokenKind::Access), Err(AuthError::InvalidToken)));
        assert!(matches!(tokens.verify(&pair.access_token, TokenKind::Refresh), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected_without_leeway() {
        let tokens = service(&[0]);
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: Uuid::new_v4(),
                typ: TokenKind::Access,
                iat: now - 120,
                exp: now - 1,
                jti: Uuid::new_v4(),
            })
            .unwrap();
        assert!(matches!(tokens.verify(&token, TokenKind::Access), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let other = service(&[1]);
        let token = other.issue(Uuid::new_v4(), TokenKind::Access).unwrap();
        assert!(matches!(service(&[0]).verify(&token, TokenKind::Access), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn tokens_from_a_rotated_key_still_verify() {
        let old = service(&[0]);
        let token = old.issue(Uuid::new_v4(), TokenKind::Access).unwrap();
        let rotated = service(&[0, 1]);
        assert!(rotated.verify(&token, TokenKind::Access).is_ok());
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let tokens = service(&[0]);
        let token = tokens.issue(Uuid::new_v4(), TokenKind::Access).unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let forged = Claims {
            sub: Uuid::new_v4(),
            typ: TokenKind::Access,
            iat: 0,
            exp: i64::MAX / 2,
            jti: Uuid::new_v4(),
        };
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        assert!(matches!(tokens.verify(&parts.join("."), TokenKind::Access), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn refresh_issues_a_new_pair_for_the_same_subject() {
        let tokens = service(&[0]);
        let subject = Uuid::new_v4();
        let pair = tokens.issue_pair(subject).unwrap();
        let (claims, next) = tokens.refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.sub, subject);
        assert_eq!(tokens.verify(&next.access_token, TokenKind::Access).unwrap().sub, subject);
        assert!(tokens.refresh(&pair.access_token).is_err());
    }
}
