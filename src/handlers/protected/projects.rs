// handlers/protected/projects.rs - Project creation and lookup
//
// The creator's Permission row comes from the role matrix and is stored in
// the same write as the project.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::project_permission;
use crate::database::models::{Project, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions::{self, Permission};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/**
 * POST /api/projects - Create a project owned by the caller
 *
 * Expected Input:
 * ```json
 * { "name": "string" }  // Required, non-empty
 * ```
 *
 * Allowed when the caller's role grants `can_create_projects` (admin, staff,
 * consultant). Returns the project; the caller's row is visible via the
 * members endpoints.
 */
pub async fn project_create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let project = Project::new(name, user.id);
    let owner = Permission::for_role(user.id, project.id, user.role);
    permissions::assert_can_create_projects(&user, Some(&owner))?;

    state.stores.projects.insert(&project, &owner).await?;

    info!(project_id = %project.id, created_by = %user.id, "project created");
    Ok(ApiResponse::created(project))
}

/// GET /api/projects/:project_id
pub async fn project_get(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Project> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_viewable(&user, permission.as_ref())?;

    let project = state
        .stores
        .projects
        .find(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    Ok(ApiResponse::success(project))
}
