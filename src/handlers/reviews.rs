//! Review HTTP handlers.
//!
//! - POST /api/v1/applications/{id}/reviews - Assign a reviewer (admin)
//! - GET /api/v1/applications/{id}/reviews - Reviews of an application (admin, staff)
//! - GET /api/v1/reviews - The caller's own reviews
//! - PUT /api/v1/reviews/{id} - Update the caller's review

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        review::{ApplicationReview, AssignReviewerRequest, UpdateReviewRequest},
        user::Role,
    },
    services::review_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn assign_reviewer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<AssignReviewerRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let review = review_service::assign_reviewer(&pool, application_id, request.reviewer_id).await?;

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn list_application_reviews(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Vec<ApplicationReview>>, AppError> {
    if !auth.is_office() {
        return Err(AppError::Forbidden(
            "only office staff may list an application's reviews".to_string(),
        ));
    }

    Ok(Json(
        review_service::list_reviews_for_application(&pool, application_id).await?,
    ))
}

pub async fn list_my_reviews(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApplicationReview>>, AppError> {
    auth.require(&[Role::CommitteeMember, Role::Admin])?;

    Ok(Json(
        review_service::list_reviews_for_reviewer(&pool, auth.user_id).await?,
    ))
}

/// Update the caller's review.
///
/// # Request Body
///
/// ```json
/// { "status": "COMPLETED", "recommendation": "APPROVE", "comments": "No concerns." }
/// ```
///
/// # Response
///
/// - **200 OK**: updated review
/// - **404**: no such review assigned to the caller
/// - **409**: the review is already completed
pub async fn update_review(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(review_id): Path<Uuid>,
    Json(request): Json<UpdateReviewRequest>,
) -> Result<Json<ApplicationReview>, AppError> {
    let review = review_service::update_review(&pool, &auth, review_id, request).await?;

    Ok(Json(review))
}
