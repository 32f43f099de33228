//! Application HTTP handlers.
//!
//! - POST /api/v1/applications - Submit an application (applicant)
//! - GET /api/v1/applications - List visible applications
//! - GET /api/v1/applications/{id} - Application detail
//! - GET /api/v1/applications/{id}/history - Status history
//! - GET /api/v1/applications/{id}/letters - Issued letters
//! - POST /api/v1/applications/{id}/resubmit - Resubmit after a return
//! - POST /api/v1/applications/{id}/document-check - Start the document check
//! - POST /api/v1/applications/{id}/document-check/complete - Forward or return
//! - POST /api/v1/applications/{id}/preliminary-review - Return, expedite or assign

use crate::{
    db::{AppState, DbPool},
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        application::{
            Application, ApplicationDetailResponse, CompleteDocumentCheckRequest,
            ListApplicationsQuery, PreliminaryReviewRequest, ResubmitApplicationRequest,
            StatusHistoryEntry, SubmitApplicationRequest,
        },
        letter::Letter,
    },
    services::application_service,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Submit a new application.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Sleep quality in night-shift nurses",
///   "research_type": "HUMAN_SUBJECTS",
///   "documents": [
///     { "document_type": "PROPOSAL", "file_name": "proposal.pdf", "url": "https://files.example.org/p.pdf" }
///   ],
///   "payment": { "amount_cents": 500000, "reference": "RCPT-2025-0142" }
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the application in `SUBMITTED`
/// - **400**: malformed request
/// - **403**: caller is not an applicant
pub async fn submit_application(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SubmitApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let application = application_service::submit_application(&pool, &auth, request).await?;

    Ok((StatusCode::CREATED, Json(application)))
}

/// List applications. Applicants only see their own.
///
/// Optional query: `?status=DOCUMENT_CHECK`
pub async fn list_applications(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListApplicationsQuery>,
) -> Result<Json<Vec<Application>>, AppError> {
    let applications = application_service::list_applications(&pool, &auth, query.status).await?;

    Ok(Json(applications))
}

/// Application with its documents, payment and the events its status accepts.
///
/// Returns 404 for applications the caller may not see.
pub async fn get_application(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApplicationDetailResponse>, AppError> {
    let application =
        application_service::get_visible_application(&pool, &auth, application_id).await?;
    let detail = application_service::load_detail(&pool, application).await?;

    Ok(Json(detail))
}

pub async fn get_history(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Vec<StatusHistoryEntry>>, AppError> {
    application_service::get_visible_application(&pool, &auth, application_id).await?;
    let history = application_service::status_history(&pool, application_id).await?;

    Ok(Json(history))
}

pub async fn list_letters(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Vec<Letter>>, AppError> {
    application_service::get_visible_application(&pool, &auth, application_id).await?;
    let letters = application_service::list_letters(&pool, application_id).await?;

    Ok(Json(letters))
}

/// Resubmit a returned application, optionally replacing its documents.
pub async fn resubmit_application(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<ResubmitApplicationRequest>,
) -> Result<Json<Application>, AppError> {
    let application =
        application_service::resubmit_application(&pool, &auth, application_id, request).await?;

    Ok(Json(application))
}

pub async fn start_document_check(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Application>, AppError> {
    let application =
        application_service::start_document_check(&pool, &auth, application_id).await?;

    Ok(Json(application))
}

/// Finish the document check.
///
/// # Request Body
///
/// ```json
/// { "outcome": "RETURN", "comments": "The consent form is unsigned." }
/// ```
///
/// # Response
///
/// - **200 OK**: application in `PRELIMINARY_REVIEW` or `RETURNED_FOR_RESUBMISSION`
/// - **409**: application is not in `DOCUMENT_CHECK`
/// - **422**: forwarding without documents or payment
pub async fn complete_document_check(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<CompleteDocumentCheckRequest>,
) -> Result<Json<Application>, AppError> {
    let application =
        application_service::complete_document_check(&state, &auth, application_id, request)
            .await?;

    Ok(Json(application))
}

/// Preliminary review by an administrator.
///
/// # Request Body
///
/// ```json
/// { "action": "ASSIGN_COMMITTEE", "committee_id": "550e8400-e29b-41d4-a716-446655440000" }
/// ```
pub async fn preliminary_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<PreliminaryReviewRequest>,
) -> Result<Json<Application>, AppError> {
    let application =
        application_service::preliminary_review(&state, &auth, application_id, request).await?;

    Ok(Json(application))
}
