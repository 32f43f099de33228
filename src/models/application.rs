//! Application data models and API request/response types.
//!
//! This module defines:
//! - `Application`: database entity whose `status` is driven exclusively by
//!   [`crate::workflow`]
//! - `Document` / `Payment`: what the applicant submitted alongside
//! - `StatusHistoryEntry`: audit trail of every transition
//! - request types for submission, document check and preliminary review

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::committee::CommitteeType;
use crate::workflow::ApplicationStatus;

text_enum! {
    pub enum ResearchType {
        HumanSubjects => "HUMAN_SUBJECTS",
        ClinicalTrial => "CLINICAL_TRIAL",
        Animal => "ANIMAL",
        Other => "OTHER",
    }
}

impl ResearchType {
    /// Committee that normally reviews this kind of research.
    pub fn suggested_committee(&self) -> CommitteeType {
        match self {
            ResearchType::ClinicalTrial => CommitteeType::Ctsc,
            ResearchType::Animal => CommitteeType::Arwc,
            ResearchType::HumanSubjects | ResearchType::Other => CommitteeType::Erc,
        }
    }
}

/// Represents an application record from the database.
///
/// # Database Table
///
/// Maps to the `applications` table. The `status` column is TEXT but is
/// parsed into [`ApplicationStatus`] on read and only ever written by
/// [`crate::workflow::transition_application`].
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Application {
    pub id: Uuid,

    /// Owning applicant (`applicants.user_id`)
    pub applicant_id: Uuid,

    pub title: String,

    #[sqlx(try_from = "String")]
    pub research_type: ResearchType,

    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,

    /// Committee chosen during preliminary review
    pub committee_id: Option<Uuid>,

    /// Approved through the expedited path, without a committee meeting
    pub expedited: bool,

    pub submission_date: NaiveDate,

    pub approval_date: Option<NaiveDate>,

    /// Approval lapses after this date
    pub expiry_date: Option<NaiveDate>,

    pub admin_comments: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub application_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub amount_cents: i64,
    pub reference: String,
    pub paid_at: DateTime<Utc>,
}

/// One row of `application_status_history`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub application_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub event: String,
    pub actor_id: Option<Uuid>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reference to an uploaded document.
///
/// Files live in external storage; only their URL is recorded here.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub document_type: String,
    pub file_name: String,
    pub url: String,
}

impl DocumentInput {
    fn validate(&self) -> Result<(), AppError> {
        if self.document_type.trim().is_empty() || self.file_name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "document_type and file_name are required".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.url).map_err(|_| {
            AppError::InvalidRequest(format!("invalid document url: {}", self.url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::InvalidRequest(
                "document url must use HTTP or HTTPS".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount_cents: i64,
    pub reference: String,
}

/// Request body for `POST /api/v1/applications`.
///
/// # JSON Example
///
/// ```json
/// {
///   "title": "Sleep patterns of night-shift nurses",
///   "research_type": "HUMAN_SUBJECTS",
///   "documents": [
///     { "document_type": "PROPOSAL", "file_name": "proposal.pdf", "url": "https://files.example.org/p.pdf" }
///   ],
///   "payment": { "amount_cents": 500000, "reference": "RCPT-2025-0042" }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct SubmitApplicationRequest {
    pub title: String,
    pub research_type: ResearchType,
    pub documents: Vec<DocumentInput>,
    pub payment: Option<PaymentInput>,
}

impl SubmitApplicationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidRequest("title is required".to_string()));
        }
        if self.documents.is_empty() {
            return Err(AppError::InvalidRequest(
                "at least one document is required".to_string(),
            ));
        }
        for document in &self.documents {
            document.validate()?;
        }
        if let Some(ref payment) = self.payment {
            validate_payment(payment)?;
        }
        Ok(())
    }
}

/// Request body for `POST /api/v1/applications/{id}/resubmit`.
///
/// When `documents` is present it replaces the previously submitted set.
#[derive(Debug, Deserialize)]
pub struct ResubmitApplicationRequest {
    pub documents: Option<Vec<DocumentInput>>,
    pub payment: Option<PaymentInput>,
    pub comment: Option<String>,
}

impl ResubmitApplicationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(ref documents) = self.documents {
            if documents.is_empty() {
                return Err(AppError::InvalidRequest(
                    "documents, when given, must not be empty".to_string(),
                ));
            }
            for document in documents {
                document.validate()?;
            }
        }
        if let Some(ref payment) = self.payment {
            validate_payment(payment)?;
        }
        Ok(())
    }
}

fn validate_payment(payment: &PaymentInput) -> Result<(), AppError> {
    if payment.amount_cents <= 0 {
        return Err(AppError::InvalidRequest(
            "payment amount must be positive".to_string(),
        ));
    }
    if payment.reference.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "payment reference is required".to_string(),
        ));
    }
    Ok(())
}

text_enum! {
    pub enum DocumentCheckOutcome {
        Forward => "FORWARD",
        Return => "RETURN",
    }
}

/// Request body for `POST /api/v1/applications/{id}/document-check/complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteDocumentCheckRequest {
    pub outcome: DocumentCheckOutcome,
    pub comments: Option<String>,
}

text_enum! {
    pub enum PreliminaryAction {
        ReturnForResubmission => "RETURN_FOR_RESUBMISSION",
        ExpeditedApproval => "EXPEDITED_APPROVAL",
        AssignCommittee => "ASSIGN_COMMITTEE",
    }
}

/// Request body for `POST /api/v1/applications/{id}/preliminary-review`.
#[derive(Debug, Deserialize)]
pub struct PreliminaryReviewRequest {
    pub action: PreliminaryAction,
    pub committee_id: Option<Uuid>,
    pub comments: Option<String>,
}

impl PreliminaryReviewRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match (self.action, self.committee_id) {
            (PreliminaryAction::AssignCommittee, None) => Err(AppError::InvalidRequest(
                "committee_id is required for ASSIGN_COMMITTEE".to_string(),
            )),
            (PreliminaryAction::AssignCommittee, Some(_)) => Ok(()),
            (_, Some(_)) => Err(AppError::InvalidRequest(
                "committee_id is only accepted for ASSIGN_COMMITTEE".to_string(),
            )),
            (PreliminaryAction::ReturnForResubmission, None)
                if self.comments.as_deref().is_none_or(|c| c.trim().is_empty()) =>
            {
                Err(AppError::InvalidRequest(
                    "comments are required when returning an application".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Query string for `GET /api/v1/applications`.
#[derive(Debug, Default, Deserialize)]
pub struct ListApplicationsQuery {
    pub status: Option<ApplicationStatus>,
}

/// Application together with what was submitted and what can happen next.
#[derive(Debug, Serialize)]
pub struct ApplicationDetailResponse {
    #[serde(flatten)]
    pub application: Application,
    pub documents: Vec<Document>,
    pub payment: Option<Payment>,
    pub suggested_committee_type: CommitteeType,
    /// Workflow events the current status accepts
    pub allowed_events: Vec<&'static str>,
}
