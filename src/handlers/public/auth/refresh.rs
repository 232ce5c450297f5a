// handlers/public/auth/refresh.rs - POST /auth/refresh handler

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::auth::{AuthError, TokenPair};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/**
 * POST /auth/refresh - Exchange a valid refresh token for a new pair
 *
 * Expected Input:
 * ```json
 * { "refresh_token": "eyJhbGciOiJSUzI1NiIsImtpZCI6..." }
 * ```
 */
pub async fn refresh_post(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    let (claims, pair) = state.auth.tokens().refresh(&payload.refresh_token)?;

    // The account must still exist
    if state.stores.users.find_by_reference(claims.sub).await?.is_none() {
        return Err(AuthError::InvalidToken.into());
    }

    Ok(ApiResponse::success(pair))
}
