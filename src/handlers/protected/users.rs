// handlers/protected/users.rs - Account creation (admin only)

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use tracing::{info, warn};

use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions::{PermissionError, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/**
 * POST /api/users - Register an account
 *
 * Expected Input:
 * ```json
 * {
 *   "email": "string",     // Required, unique (case-insensitive)
 *   "password": "string",  // Required, checked against the password policy
 *   "role": "staff"        // admin | staff | consultant | guest
 * }
 * ```
 *
 * Errors: 403 for non-admins, 422 for a weak password, 409 for a taken email.
 */
pub async fn user_create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<User> {
    if user.role != Role::Admin {
        warn!(user_id = %user.id, "rejected account creation by non-admin");
        return Err(PermissionError::Forbidden.into());
    }

    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }

    let account = state.auth.register(email, &payload.password, payload.role)?;
    state.stores.users.insert(&account).await?;

    info!(user_id = %account.id, role = account.role.as_str(), created_by = %user.id, "account created");
    Ok(ApiResponse::created(account))
}
