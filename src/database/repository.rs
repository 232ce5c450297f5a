//! Store traits consumed by the HTTP layer. Implemented over Postgres
//! ([`super::postgres`]) and in memory ([`super::memory`]).

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::manager::DbResult;
use super::memory::MemoryStore;
use super::models::{Document, Person, Project, User};
use super::postgres::PgStore;
use crate::permissions::{Permission, PermissionPatch};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>>;
    async fn find_by_reference(&self, reference_id: Uuid) -> DbResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;
    /// Fails with `Conflict` if the email is taken
    async fn insert(&self, user: &User) -> DbResult<()>;
    async fn update_mfa(
        &self,
        id: Uuid,
        enabled: bool,
        totp_secret: Option<&str>,
        backup_codes: Option<&str>,
    ) -> DbResult<()>;
    /// Swap the sealed backup-code batch only if it still equals `expected`.
    /// Returns false when another login consumed a code first.
    async fn replace_backup_codes(&self, id: Uuid, expected: &str, remaining: &str) -> DbResult<bool>;

    /// Connectivity check for `/health`
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find(&self, id: Uuid) -> DbResult<Option<Project>>;
    /// Store the project together with its creator's Permission row; neither
    /// is kept if the other fails
    async fn insert(&self, project: &Project, owner: &Permission) -> DbResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find(&self, user_id: Uuid, project_id: Uuid) -> DbResult<Option<Permission>>;
    async fn list_for_project(&self, project_id: Uuid) -> DbResult<Vec<Permission>>;
    /// Fails with `Conflict` if the (user, project) pair already has a row
    async fn insert(&self, permission: &Permission) -> DbResult<()>;
    /// Partial update; last write wins. Fails with `NotFound` if there is no row.
    async fn update(&self, user_id: Uuid, project_id: Uuid, patch: &PermissionPatch) -> DbResult<Permission>;
    /// Returns whether a row was removed
    async fn delete(&self, user_id: Uuid, project_id: Uuid) -> DbResult<bool>;
}

#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Person>>;
    async fn insert(&self, person: &Person) -> DbResult<()>;
    /// Replace name and sealed contact fields. Fails with `NotFound` if missing.
    async fn update(&self, person: &Person) -> DbResult<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>>;
    async fn insert(&self, document: &Document) -> DbResult<()>;
    /// Remove and return the row, if it existed
    async fn delete(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>>;
}

/// The stores handed to request handlers
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub persons: Arc<dyn PersonStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            projects: store.clone(),
            permissions: store.clone(),
            persons: store.clone(),
            documents: store,
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            projects: store.clone(),
            permissions: store.clone(),
            persons: store.clone(),
            documents: store,
        }
    }
}
