//! Committee meeting models.
//!
//! A meeting belongs to one committee and carries a set of applications.
//! Each `MeetingApplication` row holds the committee's decision for one
//! application and whether an administrator has ratified it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

text_enum! {
    pub enum MeetingStatus {
        Scheduled => "SCHEDULED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

text_enum! {
    /// Committee decision on one application.
    pub enum Decision {
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Revise => "REVISE",
        /// Not decided yet; cannot be ratified.
        Pending => "PENDING",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CommitteeMeeting {
    pub id: Uuid,
    pub committee_id: Uuid,
    pub meeting_date: DateTime<Utc>,
    pub location: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: MeetingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct MeetingApplication {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub application_id: Uuid,
    #[sqlx(try_from = "String")]
    pub decision: Decision,
    pub comments: Option<String>,
    pub ratified: bool,
    pub ratified_at: Option<DateTime<Utc>>,
    pub ratified_by: Option<Uuid>,
}

/// Request body for `POST /api/v1/meetings`.
///
/// # JSON Example
///
/// ```json
/// {
///   "committee_id": "550e8400-e29b-41d4-a716-446655440000",
///   "meeting_date": "2025-03-14T09:30:00Z",
///   "location": "Board Room 2",
///   "application_ids": ["660e8400-e29b-41d4-a716-446655440001"]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ScheduleMeetingRequest {
    pub committee_id: Uuid,
    pub meeting_date: DateTime<Utc>,
    pub location: Option<String>,
    pub application_ids: Vec<Uuid>,
}

impl ScheduleMeetingRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.application_ids.is_empty() {
            return Err(AppError::InvalidRequest(
                "a meeting needs at least one application".to_string(),
            ));
        }

        let mut ids = self.application_ids.clone();
        ids.sort();
        ids.dedup();
        if ids.len() != self.application_ids.len() {
            return Err(AppError::InvalidRequest(
                "application_ids contains duplicates".to_string(),
            ));
        }

        Ok(())
    }
}

/// Request body for `PUT /api/v1/meetings/{id}/decisions/{application_id}`.
#[derive(Debug, Deserialize)]
pub struct RecordDecisionRequest {
    pub decision: Decision,
    pub comments: Option<String>,
}

impl RecordDecisionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.decision == Decision::Pending {
            return Err(AppError::InvalidRequest(
                "decision must be APPROVED, REJECTED or REVISE".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request body for `POST /api/v1/meetings/{id}/ratify`.
///
/// Without `application_ids`, every decided and unratified application on the
/// meeting is ratified.
#[derive(Debug, Default, Deserialize)]
pub struct RatifyRequest {
    #[serde(default)]
    pub application_ids: Option<Vec<Uuid>>,
}

/// Meeting with the applications on its agenda.
#[derive(Debug, Serialize)]
pub struct MeetingDetailResponse {
    #[serde(flatten)]
    pub meeting: CommitteeMeeting,
    pub applications: Vec<MeetingApplication>,
}

/// Result of ratifying one meeting application.
#[derive(Debug, Serialize)]
pub struct RatifiedApplication {
    pub application_id: Uuid,
    pub decision: Decision,
    pub status: crate::workflow::ApplicationStatus,
    pub letter_id: Uuid,
    pub notification_id: Uuid,
}

/// Response body for `POST /api/v1/meetings/{id}/ratify`.
#[derive(Debug, Serialize)]
pub struct RatificationResponse {
    pub meeting_id: Uuid,
    pub meeting_status: MeetingStatus,
    pub ratified: Vec<RatifiedApplication>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_decision_is_not_recordable() {
        let request = RecordDecisionRequest {
            decision: Decision::Pending,
            comments: None,
        };
        assert!(request.validate().is_err());

        let request = RecordDecisionRequest {
            decision: Decision::Revise,
            comments: Some("clarify consent form".to_string()),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn schedule_rejects_empty_and_duplicate_agendas() {
        let id = Uuid::new_v4();
        let mut request = ScheduleMeetingRequest {
            committee_id: Uuid::new_v4(),
            meeting_date: Utc::now(),
            location: None,
            application_ids: vec![],
        };
        assert!(request.validate().is_err());

        request.application_ids = vec![id, id];
        assert!(request.validate().is_err());

        request.application_ids = vec![id, Uuid::new_v4()];
        assert!(request.validate().is_ok());
    }

    #[test]
    fn ratify_request_accepts_empty_body() {
        let request: RatifyRequest = serde_json::from_str("{}").unwrap();
        assert!(request.application_ids.is_none());
    }
}
