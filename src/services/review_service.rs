//! Reviewer assignment and review updates.

use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, conflict_on_unique};
use crate::middleware::auth::AuthContext;
use crate::models::application::Application;
use crate::models::committee::MemberRole;
use crate::models::review::{ApplicationReview, ReviewStatus, UpdateReviewRequest};
use crate::services::committee_service;

/// Assign a committee member to review an application.
///
/// # Validation
///
/// - The application must be under committee review
/// - The reviewer must hold a CHAIR or MEMBER seat on the application's committee
/// - One review per (application, reviewer)
pub async fn assign_reviewer(
    pool: &DbPool,
    application_id: Uuid,
    reviewer_id: Uuid,
) -> Result<ApplicationReview, AppError> {
    let application = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Application"))?;

    let committee_id = match application.committee_id {
        Some(committee_id) if application.status.is_committee_review() => committee_id,
        _ => {
            return Err(AppError::RuleViolation(format!(
                "reviewers can only be assigned during committee review (status is {})",
                application.status
            )));
        }
    };

    let mut conn = pool.acquire().await?;
    let seat = committee_service::member_role(&mut conn, committee_id, reviewer_id).await?;
    drop(conn);

    match seat {
        Some(MemberRole::Chair | MemberRole::Member) => {}
        Some(MemberRole::Staff) | None => {
            return Err(AppError::RuleViolation(
                "the reviewer must be a member of the assigned committee".to_string(),
            ));
        }
    }

    let review = sqlx::query_as::<_, ApplicationReview>(
        r#"
        INSERT INTO application_reviews (application_id, reviewer_id)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(application_id)
    .bind(reviewer_id)
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "the reviewer is already assigned to this application"))?;

    tracing::info!(application_id = %application_id, reviewer_id = %reviewer_id, "reviewer assigned");

    Ok(review)
}

/// Reviewer updates their own review. Completed reviews are final.
pub async fn update_review(
    pool: &DbPool,
    auth: &AuthContext,
    review_id: Uuid,
    request: UpdateReviewRequest,
) -> Result<ApplicationReview, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;

    let review = sqlx::query_as::<_, ApplicationReview>(
        "SELECT * FROM application_reviews WHERE id = $1 AND reviewer_id = $2 FOR UPDATE",
    )
    .bind(review_id)
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Review"))?;

    if review.status == ReviewStatus::Completed {
        return Err(AppError::Conflict(
            "completed reviews cannot be changed".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, ApplicationReview>(
        r#"
        UPDATE application_reviews
        SET status = $1,
            recommendation = $2,
            comments = $3,
            updated_at = NOW()
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(request.status.as_str())
    .bind(request.recommendation.map(|r| r.as_str()))
    .bind(request.comments)
    .bind(review.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(updated)
}

pub async fn list_reviews_for_reviewer(
    pool: &DbPool,
    reviewer_id: Uuid,
) -> Result<Vec<ApplicationReview>, AppError> {
    let reviews = sqlx::query_as::<_, ApplicationReview>(
        "SELECT * FROM application_reviews WHERE reviewer_id = $1 ORDER BY created_at DESC",
    )
    .bind(reviewer_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

pub async fn list_reviews_for_application(
    pool: &DbPool,
    application_id: Uuid,
) -> Result<Vec<ApplicationReview>, AppError> {
    let reviews = sqlx::query_as::<_, ApplicationReview>(
        "SELECT * FROM application_reviews WHERE application_id = $1 ORDER BY created_at",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}
