use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stable id carried in tokens instead of the database key
    pub reference_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub mfa_enabled: bool,
    /// Sealed base32 TOTP secret
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    /// Sealed comma-separated batch of unused backup codes
    #[serde(skip_serializing)]
    pub backup_codes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            role,
            mfa_enabled: false,
            totp_secret: None,
            backup_codes: None,
            created_at: Utc::now(),
        }
    }
}
