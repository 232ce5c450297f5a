use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of an uploaded file. The body lives encrypted in storage at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub person_id: Option<Uuid>,
    pub original_name: String,
    pub content_type: String,
    pub size: i64,
    #[serde(skip_serializing)]
    pub path: String,
    /// Sealed AES key, nonce and tag
    #[serde(skip_serializing)]
    pub encryption_key: String,
    pub created_at: DateTime<Utc>,
}
