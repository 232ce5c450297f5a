// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{AuthError, LoginAttempt, TokenPair};
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(flatten)]
    pub attempt: LoginAttempt,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

/**
 * POST /auth/login - Authenticate and receive an access/refresh token pair
 *
 * Expected Input:
 * ```json
 * {
 *   "email": "string",         // Required
 *   "password": "string",      // Required
 *   "totp": "123456",          // Required when MFA is enabled (or backup_code)
 *   "backup_code": "ABCD2345"  // Single-use alternative to totp
 * }
 * ```
 *
 * Errors: 401 for bad credentials or a bad code, 417 when MFA is enabled and
 * no code was sent.
 */
pub async fn login_post(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let Some(mut user) = state.stores.users.find_by_email(payload.email.trim()).await? else {
        return Err(state.auth.reject_unknown_account(&payload.attempt.password).into());
    };

    let outcome = state.auth.login(&user, &payload.attempt)?;

    if let Some(remaining) = outcome.remaining_backup_codes {
        // A concurrent login may have spent a code from the same batch
        let expected = user.backup_codes.as_deref().unwrap_or_default();
        if !state.stores.users.replace_backup_codes(user.id, expected, &remaining).await? {
            warn!(user_id = %user.id, "login rejected: backup code batch changed during login");
            return Err(AuthError::TotpInvalid.into());
        }
        user.backup_codes = Some(remaining);
    }

    Ok(ApiResponse::success(LoginResponse {
        tokens: outcome.tokens,
        user,
    }))
}
