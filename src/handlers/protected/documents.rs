// handlers/protected/documents.rs - Encrypted document upload and download

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::project_permission;
use crate::database::models::{Document, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
    #[serde(default)]
    pub person_id: Option<Uuid>,
}

/**
 * POST /api/projects/:project_id/documents?filename=scan.pdf[&person_id=..]
 *
 * The raw request body is the file; Content-Type must be on the allow-list.
 * Errors: 415 for a disallowed type, 413 above the upload limit.
 */
pub async fn document_upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Document> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_writable(&user, permission.as_ref())?;

    let filename = query.filename.trim();
    if filename.is_empty() {
        return Err(ApiError::bad_request("filename is required"));
    }
    if let Some(person_id) = query.person_id {
        if state.stores.persons.find(project_id, person_id).await?.is_none() {
            return Err(ApiError::not_found("Person not found"));
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let (size, sealed) = state
        .uploads
        .process_upload(filename, content_type, &body, &state.config.uploads.destination_dir)
        .await?;

    let document = Document {
        id: Uuid::new_v4(),
        project_id,
        person_id: query.person_id,
        original_name: filename.to_string(),
        content_type: crate::uploads::normalize_content_type(content_type),
        size: size as i64,
        path: sealed.path,
        encryption_key: sealed.encryption_key,
        created_at: Utc::now(),
    };

    if let Err(err) = state.stores.documents.insert(&document).await {
        // Do not leave an unreferenced blob behind
        if let Err(cleanup) = state.uploads.delete(&document.path).await {
            warn!("failed to remove orphaned upload {}: {}", document.path, cleanup);
        }
        return Err(err.into());
    }

    info!(project_id = %project_id, document_id = %document.id, size, "document uploaded");
    Ok(ApiResponse::created(document))
}

/// GET /api/projects/:project_id/documents/:document_id - decrypted body in 512-byte chunks
pub async fn document_download(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_docs_readable(&user, permission.as_ref())?;

    let document = state
        .stores
        .documents
        .find(project_id, document_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;

    let stream = state.uploads.stream(&document.path, &document.encryption_key).await?;
    let length = stream.len();
    let body = Body::from_stream(stream.into_stream().map(Ok::<_, Infallible>));

    let content_type =
        HeaderValue::from_str(&document.content_type).unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        document.original_name.replace(['"', '\\', '\r', '\n'], "_")
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response())
}

/// DELETE /api/projects/:project_id/documents/:document_id
pub async fn document_delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_deletable(&user, permission.as_ref())?;

    let document = state
        .stores
        .documents
        .delete(project_id, document_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))?;
    state.uploads.delete(&document.path).await?;

    info!(project_id = %project_id, document_id = %document.id, deleted_by = %user.id, "document deleted");
    Ok(ApiResponse::no_content())
}
