// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route Prefix: /api/*
// Middleware: jwt_auth_middleware injects the authenticated `User`.
//
// Project-scoped handlers load the caller's Permission row for the project
// and run one guard from `crate::permissions` before touching any data.

pub mod auth;
pub mod documents;
pub mod members;
pub mod persons;
pub mod projects;
pub mod users;

use uuid::Uuid;

use crate::database::models::User;
use crate::error::ApiError;
use crate::permissions::Permission;
use crate::state::AppState;

/// The caller's Permission row for `project_id`, if any. 404 if the project
/// does not exist.
pub(crate) async fn project_permission(
    state: &AppState,
    user: &User,
    project_id: Uuid,
) -> Result<Option<Permission>, ApiError> {
    if state.stores.projects.find(project_id).await?.is_none() {
        return Err(ApiError::not_found("Project not found"));
    }
    Ok(state.stores.permissions.find(user.id, project_id).await?)
}
