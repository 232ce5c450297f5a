use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::TokenKind;
use crate::error::ApiError;
use crate::state::AppState;

/// Validates the Bearer access token and injects the authenticated
/// [`crate::database::models::User`] into request extensions
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;

    let claims = state.auth.tokens().verify(&token, TokenKind::Access)?;

    // Tokens carry the reference id; a deleted account invalidates its tokens
    let user = state
        .stores
        .users
        .find_by_reference(claims.sub)
        .await?
        .ok_or_else(|| {
            debug!("token subject {} has no account", claims.sub);
            ApiError::unauthorized("Invalid or expired token")
        })?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
