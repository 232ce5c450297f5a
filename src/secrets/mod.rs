//! Sealing of personal-information fields (email, phone numbers) at rest.
//!
//! Callers not allowed to see personal data get [`SENTINEL`] in place of each
//! populated field. When the same sentinel comes back in an update it means
//! "leave unchanged": it is never sealed as a literal value.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::crypto::{CryptoResult, CryptoService, Envelope};

/// Placeholder returned instead of a redacted value
pub const SENTINEL: &str = "********";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_additional: Option<String>,
}

impl PersonalInfo {
    fn try_map<F>(&self, mut f: F) -> CryptoResult<Self>
    where
        F: FnMut(&str) -> CryptoResult<String>,
    {
        let mut apply = |field: &Option<String>| field.as_deref().map(&mut f).transpose();
        Ok(Self {
            email: apply(&self.email)?,
            phone: apply(&self.phone)?,
            phone_additional: apply(&self.phone_additional)?,
        })
    }

    /// Every populated field replaced by the sentinel; absent fields stay absent
    pub fn redacted(&self) -> Self {
        let mask = |field: &Option<String>| field.as_ref().map(|_| SENTINEL.to_string());
        Self {
            email: mask(&self.email),
            phone: mask(&self.phone),
            phone_additional: mask(&self.phone_additional),
        }
    }
}

/// Tri-state field update.
///
/// In JSON: a missing field or the sentinel is `Unchanged`, `null` is `Clear`,
/// any other string is `Set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate {
    #[default]
    Unchanged,
    Set(String),
    Clear,
}

impl FieldUpdate {
    pub fn from_value(value: impl Into<String>) -> Self {
        let value = value.into();
        if value == SENTINEL {
            FieldUpdate::Unchanged
        } else {
            FieldUpdate::Set(value)
        }
    }
}

impl<'de> Deserialize<'de> for FieldUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            None => FieldUpdate::Clear,
            Some(value) => FieldUpdate::from_value(value),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PersonalInfoUpdate {
    #[serde(default)]
    pub email: FieldUpdate,
    #[serde(default)]
    pub phone: FieldUpdate,
    #[serde(default)]
    pub phone_additional: FieldUpdate,
}

impl PersonalInfoUpdate {
    pub fn is_empty(&self) -> bool {
        self.email == FieldUpdate::Unchanged
            && self.phone == FieldUpdate::Unchanged
            && self.phone_additional == FieldUpdate::Unchanged
    }
}

#[derive(Debug, Clone)]
pub struct SecretsService {
    crypto: Arc<CryptoService>,
}

impl SecretsService {
    pub fn new(crypto: Arc<CryptoService>) -> Self {
        Self { crypto }
    }

    /// Seal every populated field with the current key
    pub fn encrypt_personal_info(&self, info: &PersonalInfo) -> CryptoResult<PersonalInfo> {
        info.try_map(|value| self.crypto.seal(value.as_bytes()))
    }

    /// Open every sealed field. Plaintext left over from before encryption
    /// was introduced passes through unchanged.
    pub fn decrypt_personal_info(&self, info: &PersonalInfo) -> CryptoResult<PersonalInfo> {
        info.try_map(|value| {
            if Envelope::is_sealed(value) {
                self.crypto.unseal_string(value)
            } else {
                Ok(value.to_string())
            }
        })
    }

    /// Decrypted values for callers allowed to see them, the sentinel otherwise
    pub fn present(&self, stored: &PersonalInfo, can_see_private_info: bool) -> CryptoResult<PersonalInfo> {
        if can_see_private_info {
            self.decrypt_personal_info(stored)
        } else {
            Ok(stored.redacted())
        }
    }

    /// Apply an update to sealed values. Unchanged fields keep their exact
    /// stored bytes; only `Set` fields are sealed again.
    pub fn apply_update(&self, stored: &PersonalInfo, update: &PersonalInfoUpdate) -> CryptoResult<PersonalInfo> {
        let apply = |current: &Option<String>, change: &FieldUpdate| -> CryptoResult<Option<String>> {
            match change {
                FieldUpdate::Unchanged => Ok(current.clone()),
                FieldUpdate::Clear => Ok(None),
                FieldUpdate::Set(value) => self.crypto.seal(value.as_bytes()).map(Some),
            }
        };

        Ok(PersonalInfo {
            email: apply(&stored.email, &update.email)?,
            phone: apply(&stored.phone, &update.phone)?,
            phone_additional: apply(&stored.phone_additional, &update.phone_additional)?,
        })
    }
}
