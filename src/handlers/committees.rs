//! Committee HTTP handlers.
//!
//! - POST /api/v1/committees - Create a committee (admin)
//! - GET /api/v1/committees - List committees
//! - GET /api/v1/committees/{id} - Get a committee
//! - POST /api/v1/committees/{id}/members - Add a member (admin)
//! - GET /api/v1/committees/{id}/members - List members

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        committee::{AddMemberRequest, Committee, CommitteeMember, CreateCommitteeRequest},
        user::Role,
    },
    services::committee_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Create a committee.
///
/// # Request Body
///
/// ```json
/// { "name": "Clinical Trials Sub-Committee", "committee_type": "CTSC" }
/// ```
pub async fn create_committee(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateCommitteeRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let committee = committee_service::create_committee(&pool, request).await?;

    Ok((StatusCode::CREATED, Json(committee)))
}

pub async fn list_committees(
    State(pool): State<DbPool>,
) -> Result<Json<Vec<Committee>>, AppError> {
    Ok(Json(committee_service::list_committees(&pool).await?))
}

pub async fn get_committee(
    State(pool): State<DbPool>,
    Path(committee_id): Path<Uuid>,
) -> Result<Json<Committee>, AppError> {
    Ok(Json(committee_service::get_committee(&pool, committee_id).await?))
}

/// Seat a user on a committee.
///
/// # Request Body
///
/// ```json
/// { "user_id": "660e8400-e29b-41d4-a716-446655440001", "role": "CHAIR" }
/// ```
///
/// # Response
///
/// - **201 Created**: the new membership
/// - **404**: committee or user does not exist
/// - **409**: already a member, or the committee already has a chair
/// - **422**: blocked user or a role that cannot hold the seat
pub async fn add_member(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(committee_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let member = committee_service::add_member(&pool, committee_id, request).await?;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn list_members(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(committee_id): Path<Uuid>,
) -> Result<Json<Vec<CommitteeMember>>, AppError> {
    auth.require(&[Role::Admin, Role::Staff, Role::CommitteeMember])?;

    Ok(Json(committee_service::list_members(&pool, committee_id).await?))
}
