//! HTTP router.
//!
//! Everything under `/api/v1` sits behind the bearer key middleware;
//! `/health` is public.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{db::AppState, handlers, middleware};

pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        // Applications
        .route(
            "/api/v1/applications",
            post(handlers::applications::submit_application)
                .get(handlers::applications::list_applications),
        )
        .route(
            "/api/v1/applications/{id}",
            get(handlers::applications::get_application),
        )
        .route(
            "/api/v1/applications/{id}/history",
            get(handlers::applications::get_history),
        )
        .route(
            "/api/v1/applications/{id}/letters",
            get(handlers::applications::list_letters),
        )
        .route(
            "/api/v1/applications/{id}/resubmit",
            post(handlers::applications::resubmit_application),
        )
        .route(
            "/api/v1/applications/{id}/document-check",
            post(handlers::applications::start_document_check),
        )
        .route(
            "/api/v1/applications/{id}/document-check/complete",
            post(handlers::applications::complete_document_check),
        )
        .route(
            "/api/v1/applications/{id}/preliminary-review",
            post(handlers::applications::preliminary_review),
        )
        // Reviews
        .route(
            "/api/v1/applications/{id}/reviews",
            post(handlers::reviews::assign_reviewer)
                .get(handlers::reviews::list_application_reviews),
        )
        .route("/api/v1/reviews", get(handlers::reviews::list_my_reviews))
        .route("/api/v1/reviews/{id}", put(handlers::reviews::update_review))
        // Committees
        .route(
            "/api/v1/committees",
            post(handlers::committees::create_committee)
                .get(handlers::committees::list_committees),
        )
        .route(
            "/api/v1/committees/{id}",
            get(handlers::committees::get_committee),
        )
        .route(
            "/api/v1/committees/{id}/members",
            post(handlers::committees::add_member).get(handlers::committees::list_members),
        )
        // Meetings
        .route(
            "/api/v1/meetings",
            post(handlers::meetings::schedule_meeting).get(handlers::meetings::list_meetings),
        )
        .route("/api/v1/meetings/{id}", get(handlers::meetings::get_meeting))
        .route(
            "/api/v1/meetings/{id}/decisions/{application_id}",
            put(handlers::meetings::record_decision),
        )
        .route(
            "/api/v1/meetings/{id}/ratify",
            post(handlers::meetings::ratify),
        )
        .route(
            "/api/v1/meetings/{id}/cancel",
            post(handlers::meetings::cancel_meeting),
        )
        // Users
        .route(
            "/api/v1/users",
            post(handlers::users::create_user).get(handlers::users::list_users),
        )
        .route("/api/v1/users/{id}", get(handlers::users::get_user))
        .route(
            "/api/v1/users/{id}/validity",
            patch(handlers::users::update_validity),
        )
        .route("/api/v1/me", get(handlers::users::me))
        // Notification outbox
        .route(
            "/api/v1/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/dispatch",
            post(handlers::notifications::dispatch),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
