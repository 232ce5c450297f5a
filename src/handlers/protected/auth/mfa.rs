use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MfaSetupResponse {
    pub provisioning_uri: String,
    /// Shown once; only the sealed batch is stored
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MfaConfirmRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct MfaStatus {
    pub mfa_enabled: bool,
}

/// POST /api/auth/mfa/setup - Start TOTP enrolment
///
/// Stores a new sealed secret and backup-code batch. MFA stays disabled
/// until the first code is confirmed.
pub async fn mfa_setup_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<MfaSetupResponse> {
    if user.mfa_enabled {
        return Err(ApiError::conflict("MFA is already enabled"));
    }

    let setup = state.auth.mfa().setup(&user.email)?;
    state
        .stores
        .users
        .update_mfa(user.id, false, Some(&setup.sealed_secret), Some(&setup.sealed_backup_codes))
        .await?;

    info!(user_id = %user.id, "MFA enrolment started");
    Ok(ApiResponse::success(MfaSetupResponse {
        provisioning_uri: setup.provisioning_uri,
        backup_codes: setup.backup_codes,
    }))
}

/// POST /api/auth/mfa/confirm - Enable MFA once a valid code is presented
pub async fn mfa_confirm_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<MfaConfirmRequest>,
) -> ApiResult<MfaStatus> {
    if user.mfa_enabled {
        return Err(ApiError::conflict("MFA is already enabled"));
    }
    let secret = user
        .totp_secret
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("MFA setup has not been started"))?;

    state.auth.mfa().confirm(secret, &payload.code)?;
    state
        .stores
        .users
        .update_mfa(user.id, true, Some(secret), user.backup_codes.as_deref())
        .await?;

    info!(user_id = %user.id, "MFA enabled");
    Ok(ApiResponse::success(MfaStatus { mfa_enabled: true }))
}
