//! In-process stores backing tests and database-less development runs

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::manager::{DatabaseError, DbResult};
use super::models::{Document, Person, Project, User};
use super::repository::{DocumentStore, PermissionStore, PersonStore, ProjectStore, UserStore};
use crate::permissions::{Permission, PermissionPatch};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    permissions: RwLock<HashMap<(Uuid, Uuid), Permission>>,
    persons: RwLock<HashMap<Uuid, Person>>,
    documents: RwLock<HashMap<Uuid, Document>>,
}

fn poisoned<T>(_: T) -> DatabaseError {
    DatabaseError::InvalidRow("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        Ok(self.users.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference_id: Uuid) -> DbResult<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|u| u.reference_id == reference_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn insert(&self, user: &User) -> DbResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DatabaseError::Conflict(format!("user '{}' already exists", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_mfa(
        &self,
        id: Uuid,
        enabled: bool,
        totp_secret: Option<&str>,
        backup_codes: Option<&str>,
    ) -> DbResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))?;
        user.mfa_enabled = enabled;
        user.totp_secret = totp_secret.map(str::to_string);
        user.backup_codes = backup_codes.map(str::to_string);
        Ok(())
    }

    async fn replace_backup_codes(&self, id: Uuid, expected: &str, remaining: &str) -> DbResult<bool> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))?;
        if user.backup_codes.as_deref() != Some(expected) {
            return Ok(false);
        }
        user.backup_codes = Some(remaining.to_string());
        Ok(true)
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn find(&self, id: Uuid) -> DbResult<Option<Project>> {
        Ok(self.projects.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn insert(&self, project: &Project, owner: &Permission) -> DbResult<()> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        let mut permissions = self.permissions.write().map_err(poisoned)?;
        if projects.contains_key(&project.id) {
            return Err(DatabaseError::Conflict(format!("project {}", project.id)));
        }
        let key = (owner.user_id, owner.project_id);
        if permissions.contains_key(&key) {
            return Err(DatabaseError::Conflict(format!(
                "user {} is already a member of project {}",
                owner.user_id, owner.project_id
            )));
        }
        projects.insert(project.id, project.clone());
        permissions.insert(key, owner.clone());
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn find(&self, user_id: Uuid, project_id: Uuid) -> DbResult<Option<Permission>> {
        Ok(self.permissions.read().map_err(poisoned)?.get(&(user_id, project_id)).cloned())
    }

    async fn list_for_project(&self, project_id: Uuid) -> DbResult<Vec<Permission>> {
        let rows = self.permissions.read().map_err(poisoned)?;
        let mut list: Vec<_> = rows.values().filter(|p| p.project_id == project_id).cloned().collect();
        list.sort_by_key(|p| p.user_id);
        Ok(list)
    }

    async fn insert(&self, permission: &Permission) -> DbResult<()> {
        let mut rows = self.permissions.write().map_err(poisoned)?;
        let key = (permission.user_id, permission.project_id);
        if rows.contains_key(&key) {
            return Err(DatabaseError::Conflict(format!(
                "user {} is already a member of project {}",
                permission.user_id, permission.project_id
            )));
        }
        rows.insert(key, permission.clone());
        Ok(())
    }

    async fn update(&self, user_id: Uuid, project_id: Uuid, patch: &PermissionPatch) -> DbResult<Permission> {
        let mut rows = self.permissions.write().map_err(poisoned)?;
        let row = rows
            .get_mut(&(user_id, project_id))
            .ok_or_else(|| DatabaseError::NotFound(format!("permission for user {} in project {}", user_id, project_id)))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete(&self, user_id: Uuid, project_id: Uuid) -> DbResult<bool> {
        Ok(self
            .permissions
            .write()
            .map_err(poisoned)?
            .remove(&(user_id, project_id))
            .is_some())
    }
}

#[async_trait]
impl PersonStore for MemoryStore {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Person>> {
        let persons = self.persons.read().map_err(poisoned)?;
        Ok(persons.get(&id).filter(|p| p.project_id == project_id).cloned())
    }

    async fn insert(&self, person: &Person) -> DbResult<()> {
        let mut persons = self.persons.write().map_err(poisoned)?;
        if persons.contains_key(&person.id) {
            return Err(DatabaseError::Conflict(format!("person {}", person.id)));
        }
        persons.insert(person.id, person.clone());
        Ok(())
    }

    async fn update(&self, person: &Person) -> DbResult<()> {
        let mut persons = self.persons.write().map_err(poisoned)?;
        let stored = persons
            .get_mut(&person.id)
            .filter(|p| p.project_id == person.project_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("person {}", person.id)))?;
        stored.full_name = person.full_name.clone();
        stored.personal = person.personal.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>> {
        let documents = self.documents.read().map_err(poisoned)?;
        Ok(documents.get(&id).filter(|d| d.project_id == project_id).cloned())
    }

    async fn insert(&self, document: &Document) -> DbResult<()> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        if documents.contains_key(&document.id) {
            return Err(DatabaseError::Conflict(format!("document {}", document.id)));
        }
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn delete(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        if documents.get(&id).map(|d| d.project_id) != Some(project_id) {
            return Ok(None);
        }
        Ok(documents.remove(&id))
    }
}
