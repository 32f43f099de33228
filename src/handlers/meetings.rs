//! Committee meeting HTTP handlers.
//!
//! - POST /api/v1/meetings - Schedule a meeting (admin)
//! - GET /api/v1/meetings - List meetings (`?committee_id=` filter)
//! - GET /api/v1/meetings/{id} - Meeting with its applications
//! - PUT /api/v1/meetings/{id}/decisions/{application_id} - Record a decision
//! - POST /api/v1/meetings/{id}/ratify - Ratify decisions (admin)
//! - POST /api/v1/meetings/{id}/cancel - Cancel a scheduled meeting (admin)

use crate::{
    db::{AppState, DbPool},
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        meeting::{
            CommitteeMeeting, MeetingApplication, MeetingDetailResponse, RatificationResponse,
            RatifyRequest, RecordDecisionRequest, ScheduleMeetingRequest,
        },
        user::Role,
    },
    services::meeting_service,
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
pub struct ListMeetingsQuery {
    pub committee_id: Option<Uuid>,
}

/// Schedule a meeting.
///
/// Every application must be under review by the meeting's committee. The
/// meeting and all status changes are committed together.
///
/// # Response
///
/// - **201 Created**: the meeting with one `PENDING` entry per application
/// - **409**: an application is not in a committee review status
/// - **422**: an application belongs to another committee
pub async fn schedule_meeting(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ScheduleMeetingRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let meeting = meeting_service::schedule_meeting(&pool, request, auth.user_id).await?;

    Ok((StatusCode::CREATED, Json(meeting)))
}

pub async fn list_meetings(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListMeetingsQuery>,
) -> Result<Json<Vec<CommitteeMeeting>>, AppError> {
    auth.require(&[Role::Admin, Role::Staff, Role::CommitteeMember])?;

    Ok(Json(meeting_service::list_meetings(&pool, query.committee_id).await?))
}

pub async fn get_meeting(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<MeetingDetailResponse>, AppError> {
    auth.require(&[Role::Admin, Role::Staff, Role::CommitteeMember])?;

    Ok(Json(meeting_service::get_meeting(&pool, meeting_id).await?))
}

/// Record the committee's decision on one application.
///
/// # Request Body
///
/// ```json
/// { "decision": "REVISE", "comments": "Clarify the data retention period." }
/// ```
pub async fn record_decision(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path((meeting_id, application_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RecordDecisionRequest>,
) -> Result<Json<MeetingApplication>, AppError> {
    let entry =
        meeting_service::record_decision(&pool, &auth, meeting_id, application_id, request)
            .await?;

    Ok(Json(entry))
}

/// Ratify decided applications.
///
/// The body is optional; without it every decided, unratified application
/// on the meeting is ratified.
///
/// ```json
/// { "application_ids": ["660e8400-e29b-41d4-a716-446655440001"] }
/// ```
pub async fn ratify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(meeting_id): Path<Uuid>,
    request: Option<Json<RatifyRequest>>,
) -> Result<Json<RatificationResponse>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let response = meeting_service::ratify_decisions(&state, &auth, meeting_id, request).await?;

    Ok(Json(response))
}

pub async fn cancel_meeting(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(meeting_id): Path<Uuid>,
) -> Result<Json<CommitteeMeeting>, AppError> {
    let meeting = meeting_service::cancel_meeting(&pool, &auth, meeting_id).await?;

    Ok(Json(meeting))
}
