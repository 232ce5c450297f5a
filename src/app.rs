use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// The full router: public routes, JWT-protected `/api` routes, global layers
pub fn app(state: AppState) -> Router {
    let api = &state.config.api;

    let mut router = Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        .layer(DefaultBodyLimit::max(api.max_request_size_bytes))
        .layer(TraceLayer::new_for_http());

    if api.enable_cors {
        router = router.layer(cors_layer(api));
    }

    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/health", get(public::health_get))
        .route("/auth/login", post(auth::login_post))
        .route("/auth/refresh", post(auth::refresh_post))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{auth, documents, members, persons, projects, users};

    Router::new()
        // Account
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route("/api/auth/mfa/setup", post(auth::mfa_setup_post))
        .route("/api/auth/mfa/confirm", post(auth::mfa_confirm_post))
        .route("/api/users", post(users::user_create))
        // Projects
        .route("/api/projects", post(projects::project_create))
        .route("/api/projects/:project_id", get(projects::project_get))
        // Membership
        .route(
            "/api/projects/:project_id/members",
            get(members::members_list).post(members::member_add),
        )
        .route(
            "/api/projects/:project_id/members/:user_id",
            get(members::member_get)
                .patch(members::member_patch)
                .delete(members::member_delete),
        )
        // Persons
        .route("/api/projects/:project_id/persons", post(persons::person_create))
        .route(
            "/api/projects/:project_id/persons/:person_id",
            get(persons::person_get).patch(persons::person_patch),
        )
        // Documents
        .route("/api/projects/:project_id/documents", post(documents::document_upload))
        .route(
            "/api/projects/:project_id/documents/:document_id",
            get(documents::document_download).delete(documents::document_delete),
        )
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(api: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
