//! User HTTP handlers.
//!
//! - POST /api/v1/users - Create a user and issue a key (admin)
//! - GET /api/v1/users - List users (admin, `?role=` filter)
//! - GET /api/v1/users/{id} - Get a user (admin)
//! - PATCH /api/v1/users/{id}/validity - Block or unblock (admin)
//! - GET /api/v1/me - The authenticated user

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::user::{CreateUserRequest, Role, UpdateValidityRequest, UserResponse},
    services::user_service,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

/// Create a user.
///
/// # Response (201 Created)
///
/// The body includes `api_key`. It is shown only here; the server keeps a
/// SHA-256 hash of it.
pub async fn create_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let user = user_service::create_user(&pool, request).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    auth.require(&[Role::Admin])?;

    Ok(Json(user_service::list_users(&pool, query.role).await?))
}

pub async fn get_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require(&[Role::Admin])?;

    Ok(Json(user_service::get_user(&pool, user_id).await?))
}

/// Block or unblock a user.
///
/// ```json
/// { "validity": "BLOCKED" }
/// ```
pub async fn update_validity(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateValidityRequest>,
) -> Result<Json<UserResponse>, AppError> {
    auth.require(&[Role::Admin])?;

    let user = user_service::set_validity(&pool, auth.user_id, user_id, request.validity).await?;

    Ok(Json(user))
}

pub async fn me(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(user_service::get_user(&pool, auth.user_id).await?))
}
