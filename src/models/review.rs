//! Reviewer assignments and recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

text_enum! {
    pub enum ReviewStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
    }
}

text_enum! {
    /// Reviewer's recommendation to the committee.
    pub enum Recommendation {
        Approve => "APPROVE",
        Reject => "REJECT",
        Revise => "REVISE",
        Expedite => "EXPEDITE",
    }
}

/// A reviewer's assessment of one application.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ApplicationReview {
    pub id: Uuid,
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: ReviewStatus,
    #[sqlx(try_from = "crate::models::review::OptionalRecommendation")]
    pub recommendation: Option<Recommendation>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nullable `recommendation` column as read from the database.
#[derive(Debug, sqlx::Type)]
#[sqlx(transparent)]
pub struct OptionalRecommendation(Option<String>);

impl TryFrom<OptionalRecommendation> for Option<Recommendation> {
    type Error = crate::models::ParseEnumError;

    fn try_from(value: OptionalRecommendation) -> Result<Self, Self::Error> {
        value.0.map(Recommendation::try_from).transpose()
    }
}

/// Request body for `POST /api/v1/applications/{id}/reviewers`.
#[derive(Debug, Deserialize)]
pub struct AssignReviewerRequest {
    pub reviewer_id: Uuid,
}

/// Request body for `PUT /api/v1/reviews/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub status: ReviewStatus,
    pub recommendation: Option<Recommendation>,
    pub comments: Option<String>,
}

impl UpdateReviewRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match (self.status, self.recommendation) {
            (ReviewStatus::Pending, _) => Err(AppError::InvalidRequest(
                "a review cannot be moved back to PENDING".to_string(),
            )),
            (ReviewStatus::Completed, None) => Err(AppError::InvalidRequest(
                "a completed review needs a recommendation".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
