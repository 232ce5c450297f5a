use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::secrets::PersonalInfo;

/// A displaced person tracked within a project. Contact fields are stored sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub project_id: Uuid,
    pub full_name: String,
    #[serde(flatten)]
    pub personal: PersonalInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn new(project_id: Uuid, full_name: impl Into<String>, personal: PersonalInfo) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            full_name: full_name.into(),
            personal,
            created_at: now,
            updated_at: now,
        }
    }
}
