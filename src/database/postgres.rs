//! Postgres-backed stores. Table layout lives in `sql/schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use super::manager::{DatabaseError, DbResult};
use super::models::{Document, Person, Project, User};
use super::repository::{DocumentStore, PermissionStore, PersonStore, ProjectStore, UserStore};
use crate::permissions::{Capabilities, Permission, PermissionPatch, Role};
use crate::secrets::PersonalInfo;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map unique-constraint violations to `Conflict`
fn conflict(what: String) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            DatabaseError::Conflict(what)
        }
        _ => DatabaseError::Sqlx(err),
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    reference_id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    mfa_enabled: bool,
    totp_secret: Option<String>,
    backup_codes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(DatabaseError::InvalidRow)?;
        Ok(User {
            id: row.id,
            reference_id: row.reference_id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            mfa_enabled: row.mfa_enabled,
            totp_secret: row.totp_secret,
            backup_codes: row.backup_codes,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PermissionRow {
    id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    can_create: bool,
    can_read: bool,
    can_update: bool,
    can_delete: bool,
    can_create_projects: bool,
    can_read_documents: bool,
    can_read_personal_info: bool,
    can_invite_members: bool,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: row.id,
            user_id: row.user_id,
            project_id: row.project_id,
            capabilities: Capabilities {
                can_create: row.can_create,
                can_read: row.can_read,
                can_update: row.can_update,
                can_delete: row.can_delete,
                can_create_projects: row.can_create_projects,
                can_read_documents: row.can_read_documents,
                can_read_personal_info: row.can_read_personal_info,
                can_invite_members: row.can_invite_members,
            },
        }
    }
}

#[derive(FromRow)]
struct PersonRow {
    id: Uuid,
    project_id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    phone_additional: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Person {
            id: row.id,
            project_id: row.project_id,
            full_name: row.full_name,
            personal: PersonalInfo {
                email: row.email,
                phone: row.phone,
                phone_additional: row.phone_additional,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    project_id: Uuid,
    person_id: Option<Uuid>,
    original_name: String,
    content_type: String,
    size: i64,
    path: String,
    encryption_key: String,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            project_id: row.project_id,
            person_id: row.person_id,
            original_name: row.original_name,
            content_type: row.content_type,
            size: row.size,
            path: row.path,
            encryption_key: row.encryption_key,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, reference_id, email, password_hash, role, mfa_enabled, totp_secret, backup_codes, created_at";
const PERMISSION_COLUMNS: &str = "id, user_id, project_id, can_create, can_read, can_update, can_delete, \
     can_create_projects, can_read_documents, can_read_personal_info, can_invite_members";
const PERSON_COLUMNS: &str = "id, project_id, full_name, email, phone, phone_additional, created_at, updated_at";
const DOCUMENT_COLUMNS: &str =
    "id, project_id, person_id, original_name, content_type, size, path, encryption_key, created_at";

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_reference(&self, reference_id: Uuid) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE reference_id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(reference_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO users (id, reference_id, email, password_hash, role, mfa_enabled, totp_secret, backup_codes, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(user.reference_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.mfa_enabled)
        .bind(&user.totp_secret)
        .bind(&user.backup_codes)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict(format!("user '{}' already exists", user.email)))?;
        Ok(())
    }

    async fn update_mfa(
        &self,
        id: Uuid,
        enabled: bool,
        totp_secret: Option<&str>,
        backup_codes: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE users SET mfa_enabled = $2, totp_secret = $3, backup_codes = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(enabled)
        .bind(totp_secret)
        .bind(backup_codes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn replace_backup_codes(&self, id: Uuid, expected: &str, remaining: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE users SET backup_codes = $3 WHERE id = $1 AND backup_codes = $2")
            .bind(id)
            .bind(expected)
            .bind(remaining)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_permission<'e, E: PgExecutor<'e>>(executor: E, permission: &Permission) -> DbResult<()> {
    let caps = &permission.capabilities;
    sqlx::query(&format!(
        "INSERT INTO permissions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        PERMISSION_COLUMNS
    ))
    .bind(permission.id)
    .bind(permission.user_id)
    .bind(permission.project_id)
    .bind(caps.can_create)
    .bind(caps.can_read)
    .bind(caps.can_update)
    .bind(caps.can_delete)
    .bind(caps.can_create_projects)
    .bind(caps.can_read_documents)
    .bind(caps.can_read_personal_info)
    .bind(caps.can_invite_members)
    .execute(executor)
    .await
    .map_err(conflict(format!(
        "user {} is already a member of project {}",
        permission.user_id, permission.project_id
    )))?;
    Ok(())
}

#[derive(FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn find(&self, id: Uuid) -> DbResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT id, name, created_by, created_at FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Project::from))
    }

    async fn insert(&self, project: &Project, owner: &Permission) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO projects (id, name, created_by, created_at) VALUES ($1, $2, $3, $4)")
            .bind(project.id)
            .bind(&project.name)
            .bind(project.created_by)
            .bind(project.created_at)
            .execute(&mut *tx)
            .await
            .map_err(conflict(format!("project {}", project.id)))?;
        insert_permission(&mut *tx, owner).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn find(&self, user_id: Uuid, project_id: Uuid) -> DbResult<Option<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions WHERE user_id = $1 AND project_id = $2",
            PERMISSION_COLUMNS
        );
        let row = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(user_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Permission::from))
    }

    async fn list_for_project(&self, project_id: Uuid) -> DbResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions WHERE project_id = $1 ORDER BY user_id",
            PERMISSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn insert(&self, permission: &Permission) -> DbResult<()> {
        insert_permission(&self.pool, permission).await
    }

    async fn update(&self, user_id: Uuid, project_id: Uuid, patch: &PermissionPatch) -> DbResult<Permission> {
        // COALESCE keeps the stored value for every flag the patch leaves out
        let sql = format!(
            "UPDATE permissions SET
                can_create = COALESCE($3, can_create),
                can_read = COALESCE($4, can_read),
                can_update = COALESCE($5, can_update),
                can_delete = COALESCE($6, can_delete),
                can_create_projects = COALESCE($7, can_create_projects),
                can_read_documents = COALESCE($8, can_read_documents),
                can_read_personal_info = COALESCE($9, can_read_personal_info),
                can_invite_members = COALESCE($10, can_invite_members)
             WHERE user_id = $1 AND project_id = $2
             RETURNING {}",
            PERMISSION_COLUMNS
        );
        let row = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(user_id)
            .bind(project_id)
            .bind(patch.can_create)
            .bind(patch.can_read)
            .bind(patch.can_update)
            .bind(patch.can_delete)
            .bind(patch.can_create_projects)
            .bind(patch.can_read_documents)
            .bind(patch.can_read_personal_info)
            .bind(patch.can_invite_members)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Permission::from).ok_or_else(|| {
            DatabaseError::NotFound(format!("permission for user {} in project {}", user_id, project_id))
        })
    }

    async fn delete(&self, user_id: Uuid, project_id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE user_id = $1 AND project_id = $2")
            .bind(user_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PersonStore for PgStore {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Person>> {
        let sql = format!("SELECT {} FROM persons WHERE project_id = $1 AND id = $2", PERSON_COLUMNS);
        let row = sqlx::query_as::<_, PersonRow>(&sql)
            .bind(project_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Person::from))
    }

    async fn insert(&self, person: &Person) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO persons ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            PERSON_COLUMNS
        ))
        .bind(person.id)
        .bind(person.project_id)
        .bind(&person.full_name)
        .bind(&person.personal.email)
        .bind(&person.personal.phone)
        .bind(&person.personal.phone_additional)
        .bind(person.created_at)
        .bind(person.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conflict(format!("person {}", person.id)))?;
        Ok(())
    }

    async fn update(&self, person: &Person) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE persons SET full_name = $3, email = $4, phone = $5, phone_additional = $6, updated_at = now()
             WHERE project_id = $1 AND id = $2",
        )
        .bind(person.project_id)
        .bind(person.id)
        .bind(&person.full_name)
        .bind(&person.personal.email)
        .bind(&person.personal.phone)
        .bind(&person.personal.phone_additional)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("person {}", person.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE project_id = $1 AND id = $2", DOCUMENT_COLUMNS);
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(project_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Document::from))
    }

    async fn insert(&self, document: &Document) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO documents ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            DOCUMENT_COLUMNS
        ))
        .bind(document.id)
        .bind(document.project_id)
        .bind(document.person_id)
        .bind(&document.original_name)
        .bind(&document.content_type)
        .bind(document.size)
        .bind(&document.path)
        .bind(&document.encryption_key)
        .bind(document.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict(format!("document {}", document.id)))?;
        Ok(())
    }

    async fn delete(&self, project_id: Uuid, id: Uuid) -> DbResult<Option<Document>> {
        let sql = format!(
            "DELETE FROM documents WHERE project_id = $1 AND id = $2 RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(project_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Document::from))
    }
}
