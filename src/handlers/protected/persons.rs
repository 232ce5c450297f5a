// handlers/protected/persons.rs - Persons with sealed contact fields
//
// email, phone and phone_additional are sealed before they reach the store.
// Readers without can_read_personal_info get the sentinel instead of values;
// the same sentinel sent back in a PATCH leaves the field as it was.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::project_permission;
use crate::database::models::{Person, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions;
use crate::secrets::{FieldUpdate, PersonalInfo, PersonalInfoUpdate, SENTINEL};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePersonRequest {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub phone_additional: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePersonRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: FieldUpdate,
    #[serde(default)]
    pub phone: FieldUpdate,
    #[serde(default)]
    pub phone_additional: FieldUpdate,
}

/// Empty strings and the sentinel carry no value on create
fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v != SENTINEL)
}

fn with_personal(person: &Person, personal: PersonalInfo) -> Person {
    Person {
        personal,
        ..person.clone()
    }
}

/// POST /api/projects/:project_id/persons
pub async fn person_create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreatePersonRequest>,
) -> ApiResult<Person> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_writable(&user, permission.as_ref())?;

    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full_name is required"));
    }

    let personal = PersonalInfo {
        email: provided(payload.email),
        phone: provided(payload.phone),
        phone_additional: provided(payload.phone_additional),
    };
    let person = Person::new(project_id, full_name, state.secrets.encrypt_personal_info(&personal)?);
    state.stores.persons.insert(&person).await?;

    info!(project_id = %project_id, person_id = %person.id, created_by = %user.id, "person created");

    let can_see = permissions::assert_can_see_private_info(&user, permission.as_ref()).is_ok();
    let shown = if can_see {
        personal
    } else {
        person.personal.redacted()
    };
    Ok(ApiResponse::created(with_personal(&person, shown)))
}

/// GET /api/projects/:project_id/persons/:person_id
pub async fn person_get(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, person_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Person> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_viewable(&user, permission.as_ref())?;

    let person = state
        .stores
        .persons
        .find(project_id, person_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    let can_see = permissions::assert_can_see_private_info(&user, permission.as_ref()).is_ok();
    let shown = state.secrets.present(&person.personal, can_see)?;
    Ok(ApiResponse::success(with_personal(&person, shown)))
}

/// PATCH /api/projects/:project_id/persons/:person_id
///
/// Per contact field: absent or sentinel = unchanged, null = clear, string = set.
pub async fn person_patch(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((project_id, person_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePersonRequest>,
) -> ApiResult<Person> {
    let permission = project_permission(&state, &user, project_id).await?;
    permissions::assert_updatable(&user, permission.as_ref())?;

    let mut person = state
        .stores
        .persons
        .find(project_id, person_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    if let Some(name) = payload.full_name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(ApiError::bad_request("full_name cannot be empty"));
        }
        person.full_name = name.to_string();
    }

    let update = PersonalInfoUpdate {
        email: payload.email,
        phone: payload.phone,
        phone_additional: payload.phone_additional,
    };
    if !update.is_empty() {
        person.personal = state.secrets.apply_update(&person.personal, &update)?;
    }
    state.stores.persons.update(&person).await?;

    info!(project_id = %project_id, person_id = %person.id, updated_by = %user.id, "person updated");

    // Updaters hold can_read_personal_info, so they see the values
    let shown = state.secrets.decrypt_personal_info(&person.personal)?;
    Ok(ApiResponse::success(with_personal(&person, shown)))
}
