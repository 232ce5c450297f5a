// handlers/protected/members.rs - Project membership (Permission rows)
//
// Non-admins can only hand out flags their own row holds and cannot edit
// their own row.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::project_permission;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions::{self, Capabilities, Permission, PermissionError, PermissionPatch, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    /// Explicit grant; the member's role defaults apply when omitted
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

/// GET /api/projects/:project_id/members
pub async fn members_list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Vec<Permission>> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_viewable(&user, permission.as_ref())?;

    Ok(ApiResponse::success(state.stores.permissions.list_for_project(project_id).await?))
}

/// POST /api/projects/:project_id/members
pub async fn member_add(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<Permission> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_can_invite(&user, permission.as_ref())?;

    let member = state
        .stores
        .users
        .find_by_id(payload.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", payload.user_id)))?;

    let capabilities = payload
        .capabilities
        .unwrap_or_else(|| Capabilities::defaults_for(member.role));
    permissions::assert_can_grant(&user, permission.as_ref(), &capabilities)?;

    let row = Permission::new(member.id, project_id, capabilities);
    state.stores.permissions.insert(&row).await?;

    info!(project_id = %project_id, member_id = %member.id, invited_by = %user.id, "member added");
    Ok(ApiResponse::created(row))
}

/// GET /api/projects/:project_id/members/:user_id
pub async fn member_get(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Permission> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_viewable(&user, permission.as_ref())?;

    let row = state
        .stores
        .permissions
        .find(member_id, project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    Ok(ApiResponse::success(row))
}

/// PATCH /api/projects/:project_id/members/:user_id - only supplied flags change
pub async fn member_patch(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<PermissionPatch>,
) -> ApiResult<Permission> {
    let permission = project_permission(&state, &user, project_id).await?;
    if member_id == user.id && user.role != Role::Admin {
        warn!(user_id = %user.id, project_id = %project_id, "rejected edit of own permission row");
        return Err(PermissionError::Forbidden.into());
    }
    permissions::assert_can_grant(&user, permission.as_ref(), &patch.granted())?;

    let row = state.stores.permissions.update(member_id, project_id, &patch).await?;
    info!(project_id = %project_id, member_id = %member_id, updated_by = %user.id, "member permissions updated");
    Ok(ApiResponse::success(row))
}

/// DELETE /api/projects/:project_id/members/:user_id
pub async fn member_delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_deletable(&user, permission.as_ref())?;

    if !state.stores.permissions.delete(member_id, project_id).await? {
        return Err(ApiError::not_found("Member not found"));
    }
    info!(project_id = %project_id, member_id = %member_id, removed_by = %user.id, "member removed");
    Ok(ApiResponse::no_content())
}
