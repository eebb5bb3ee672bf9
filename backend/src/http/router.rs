//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The gateway in front of the service owns origin policy.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Semesters
        .route(
            "/semesters",
            get(handlers::list_semesters).post(handlers::create_semester),
        )
        .route(
            "/semesters/{id}",
            get(handlers::get_semester).delete(handlers::delete_semester),
        )
        .route("/semesters/{id}/activate", put(handlers::activate_semester))
        .route("/semesters/{id}/loads", get(handlers::semester_loads))
        .route("/semesters/{id}/recompute", post(handlers::recompute_semester))
        // Catalog
        .route(
            "/courses",
            get(handlers::list_courses).post(handlers::create_course),
        )
        .route(
            "/courses/{id}",
            get(handlers::get_course).delete(handlers::delete_course),
        )
        .route(
            "/courses/class/{id}",
            get(handlers::get_course_class).delete(handlers::delete_course_class),
        )
        // Assignment
        .route(
            "/slots/{id}",
            get(handlers::get_slot)
                .put(handlers::claim_slot)
                .delete(handlers::release_slot),
        )
        .route("/slots/{id}/assignee", put(handlers::reassign_slot))
        // Instructors
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/users/me", get(handlers::current_user))
        .route("/users/{id}/semesters", get(handlers::user_semesters))
        .route(
            "/users/{id}/semesters/{semester_id}",
            get(handlers::instructor_load),
        )
        .route("/users/{id}/active", put(handlers::set_user_active));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
