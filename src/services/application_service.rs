//! Application service - submission, document check and preliminary review.
//!
//! Every operation that changes an application's status opens one database
//! transaction, moves the application through
//! [`workflow::transition_application`](crate::workflow::transition_application)
//! and performs its side effects (documents, committee assignment, letters,
//! notifications) before committing. Queued mail is dispatched after commit.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::{AppState, DbPool};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::application::{
    Application, ApplicationDetailResponse, CompleteDocumentCheckRequest, Document,
    DocumentCheckOutcome, DocumentInput, Payment, PaymentInput, PreliminaryAction,
    PreliminaryReviewRequest, ResubmitApplicationRequest, StatusHistoryEntry,
    SubmitApplicationRequest,
};
use crate::models::committee::Committee;
use crate::models::letter::{Letter, LetterKind};
use crate::models::notification::NewNotification;
use crate::models::user::Role;
use crate::services::{letter_service, notification_service};
use crate::workflow::{self, ApplicationStatus, WorkflowEvent};

/// Submit a new application.
///
/// # Process
///
/// 1. Verify the caller has an applicant profile
/// 2. Insert the application (`SUBMITTED`), its documents and payment
/// 3. Record the initial status history entry
/// 4. Commit
pub async fn submit_application(
    pool: &DbPool,
    auth: &AuthContext,
    request: SubmitApplicationRequest,
) -> Result<Application, AppError> {
    auth.require(&[Role::Applicant])?;
    request.validate()?;

    let mut tx = pool.begin().await?;

    let has_profile: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM applicants WHERE user_id = $1)")
            .bind(auth.user_id)
            .fetch_one(&mut *tx)
            .await?;
    if !has_profile {
        return Err(AppError::RuleViolation(
            "an applicant profile is required to submit applications".to_string(),
        ));
    }

    let application = sqlx::query_as::<_, Application>(
        r#"
        INSERT INTO applications (applicant_id, title, research_type, status)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(request.title.trim())
    .bind(request.research_type.as_str())
    .bind(ApplicationStatus::Submitted.as_str())
    .fetch_one(&mut *tx)
    .await?;

    insert_documents(&mut tx, application.id, &request.documents).await?;
    if let Some(ref payment) = request.payment {
        upsert_payment(&mut tx, application.id, payment).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO application_status_history (application_id, to_status, event, actor_id)
        VALUES ($1, $2, 'submit', $3)
        "#,
    )
    .bind(application.id)
    .bind(ApplicationStatus::Submitted.as_str())
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(application_id = %application.id, applicant_id = %auth.user_id, "application submitted");

    Ok(application)
}

/// Resubmit an application that was returned.
///
/// Only the owning applicant may resubmit. New documents replace the old
/// set; a new payment replaces the old one.
pub async fn resubmit_application(
    pool: &DbPool,
    auth: &AuthContext,
    application_id: Uuid,
    request: ResubmitApplicationRequest,
) -> Result<Application, AppError> {
    auth.require(&[Role::Applicant])?;
    request.validate()?;

    let mut tx = pool.begin().await?;

    let owner: Uuid = sqlx::query_scalar("SELECT applicant_id FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Application"))?;
    if owner != auth.user_id {
        return Err(AppError::NotFound("Application"));
    }

    let application = workflow::transition_application(
        &mut tx,
        application_id,
        WorkflowEvent::Resubmit,
        auth.user_id,
        request.comment.as_deref(),
    )
    .await?;

    if let Some(ref documents) = request.documents {
        sqlx::query("DELETE FROM documents WHERE application_id = $1")
            .bind(application_id)
            .execute(&mut *tx)
            .await?;
        insert_documents(&mut tx, application_id, documents).await?;
    }
    if let Some(ref payment) = request.payment {
        upsert_payment(&mut tx, application_id, payment).await?;
    }

    // A resubmission is reviewed afresh
    let application = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET committee_id = NULL,
            submission_date = CURRENT_DATE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(application.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(application)
}

/// Office staff picks an application up for document checking.
pub async fn start_document_check(
    pool: &DbPool,
    auth: &AuthContext,
    application_id: Uuid,
) -> Result<Application, AppError> {
    auth.require(&[Role::Staff, Role::Admin])?;

    let mut tx = pool.begin().await?;
    let application = workflow::transition_application(
        &mut tx,
        application_id,
        WorkflowEvent::StartDocumentCheck,
        auth.user_id,
        None,
    )
    .await?;
    tx.commit().await?;

    Ok(application)
}

/// Finish the document check by forwarding or returning the application.
///
/// # Validation
///
/// Forwarding requires at least one document and a recorded payment.
/// Returning notifies the applicant with the staff comments.
pub async fn complete_document_check(
    state: &AppState,
    auth: &AuthContext,
    application_id: Uuid,
    request: CompleteDocumentCheckRequest,
) -> Result<Application, AppError> {
    auth.require(&[Role::Staff, Role::Admin])?;

    let mut tx = state.pool.begin().await?;

    let application = match request.outcome {
        DocumentCheckOutcome::Forward => {
            let application = workflow::transition_application(
                &mut tx,
                application_id,
                WorkflowEvent::ForwardToPreliminaryReview,
                auth.user_id,
                request.comments.as_deref(),
            )
            .await?;

            // Returning early drops tx, rolling the transition back
            let (documents, has_payment): (i64, bool) = sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM documents WHERE application_id = $1),
                    EXISTS(SELECT 1 FROM payments WHERE application_id = $1)
                "#,
            )
            .bind(application_id)
            .fetch_one(&mut *tx)
            .await?;

            if documents == 0 {
                return Err(AppError::RuleViolation(
                    "cannot forward an application without documents".to_string(),
                ));
            }
            if !has_payment {
                return Err(AppError::RuleViolation(
                    "cannot forward an application without a payment".to_string(),
                ));
            }

            application
        }
        DocumentCheckOutcome::Return => {
            let comments = request
                .comments
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    AppError::InvalidRequest(
                        "comments are required when returning an application".to_string(),
                    )
                })?;

            workflow::transition_application(
                &mut tx,
                application_id,
                WorkflowEvent::ReturnFromDocumentCheck,
                auth.user_id,
                Some(comments),
            )
            .await?;

            let application = set_admin_comments(&mut tx, application_id, comments).await?;
            notify_document_return(&mut tx, &application, comments, &state.config.erc_office_name)
                .await?;
            application
        }
    };

    tx.commit().await?;

    if request.outcome == DocumentCheckOutcome::Return {
        notification_service::spawn_dispatch(state);
    }

    Ok(application)
}

/// Administrator's preliminary review.
///
/// # Actions
///
/// - `RETURN_FOR_RESUBMISSION`: return with comments, revision letter issued
/// - `EXPEDITED_APPROVAL`: approve without a committee meeting, letter issued
/// - `ASSIGN_COMMITTEE`: move into the chosen committee's review
pub async fn preliminary_review(
    state: &AppState,
    auth: &AuthContext,
    application_id: Uuid,
    request: PreliminaryReviewRequest,
) -> Result<Application, AppError> {
    auth.require(&[Role::Admin])?;
    request.validate()?;

    let office_name = state.config.erc_office_name.as_str();
    let comments = request.comments.as_deref();
    let mut tx = state.pool.begin().await?;

    let (application, issued_letter) = match request.action {
        PreliminaryAction::ReturnForResubmission => {
            workflow::transition_application(
                &mut tx,
                application_id,
                WorkflowEvent::ReturnFromPreliminaryReview,
                auth.user_id,
                comments,
            )
            .await?;
            let application =
                set_admin_comments(&mut tx, application_id, comments.unwrap_or_default()).await?;
            letter_service::issue_letter(
                &mut tx,
                &application,
                LetterKind::Revision,
                None,
                comments,
                office_name,
            )
            .await?;
            (application, true)
        }
        PreliminaryAction::ExpeditedApproval => {
            workflow::transition_application(
                &mut tx,
                application_id,
                WorkflowEvent::ExpediteApproval,
                auth.user_id,
                comments,
            )
            .await?;
            let application = mark_approved(
                &mut tx,
                application_id,
                true,
                state.config.approval_validity_days,
            )
            .await?;
            letter_service::issue_letter(
                &mut tx,
                &application,
                LetterKind::ExpeditedApproval,
                None,
                comments,
                office_name,
            )
            .await?;
            (application, true)
        }
        PreliminaryAction::AssignCommittee => {
            let committee_id = request.committee_id.ok_or_else(|| {
                AppError::InvalidRequest("committee_id is required".to_string())
            })?;
            let committee = sqlx::query_as::<_, Committee>("SELECT * FROM committees WHERE id = $1")
                .bind(committee_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::NotFound("Committee"))?;

            workflow::transition_application(
                &mut tx,
                application_id,
                WorkflowEvent::AssignCommittee(committee.committee_type),
                auth.user_id,
                comments,
            )
            .await?;

            let application = sqlx::query_as::<_, Application>(
                "UPDATE applications SET committee_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
            )
            .bind(committee.id)
            .bind(application_id)
            .fetch_one(&mut *tx)
            .await?;

            if application.research_type.suggested_committee() != committee.committee_type {
                tracing::warn!(
                    application_id = %application_id,
                    research_type = %application.research_type,
                    committee_type = %committee.committee_type,
                    "application assigned outside its usual committee"
                );
            }
            (application, false)
        }
    };

    tx.commit().await?;

    if issued_letter {
        notification_service::spawn_dispatch(state);
    }

    Ok(application)
}

/// Fetch an application if the caller may see it.
///
/// - Applicants see their own applications
/// - Staff and admins see every application
/// - Committee members see applications assigned to their committees
pub async fn get_visible_application(
    pool: &DbPool,
    auth: &AuthContext,
    application_id: Uuid,
) -> Result<Application, AppError> {
    sqlx::query_as::<_, Application>(
        r#"
        SELECT a.* FROM applications a
        WHERE a.id = $1 AND (
            $2 IN ('ADMIN', 'STAFF')
            OR ($2 = 'APPLICANT' AND a.applicant_id = $3)
            OR ($2 = 'COMMITTEE_MEMBER' AND a.committee_id IN (
                SELECT committee_id FROM committee_members WHERE user_id = $3
            ))
        )
        "#,
    )
    .bind(application_id)
    .bind(auth.role.as_str())
    .bind(auth.user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Application"))
}

/// List applications visible to the caller, newest first.
pub async fn list_applications(
    pool: &DbPool,
    auth: &AuthContext,
    status: Option<ApplicationStatus>,
) -> Result<Vec<Application>, AppError> {
    let applications = sqlx::query_as::<_, Application>(
        r#"
        SELECT a.* FROM applications a
        WHERE ($1::TEXT IS NULL OR a.status = $1)
        AND (
            $2 IN ('ADMIN', 'STAFF')
            OR ($2 = 'APPLICANT' AND a.applicant_id = $3)
            OR ($2 = 'COMMITTEE_MEMBER' AND a.committee_id IN (
                SELECT committee_id FROM committee_members WHERE user_id = $3
            ))
        )
        ORDER BY a.created_at DESC
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .bind(auth.role.as_str())
    .bind(auth.user_id)
    .fetch_all(pool)
    .await?;

    Ok(applications)
}

/// Application with documents, payment and the events its status accepts.
pub async fn load_detail(
    pool: &DbPool,
    application: Application,
) -> Result<ApplicationDetailResponse, AppError> {
    let documents = sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE application_id = $1 ORDER BY created_at",
    )
    .bind(application.id)
    .fetch_all(pool)
    .await?;

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE application_id = $1")
        .bind(application.id)
        .fetch_optional(pool)
        .await?;

    Ok(ApplicationDetailResponse {
        allowed_events: application.status.allowed_events(),
        suggested_committee_type: application.research_type.suggested_committee(),
        application,
        documents,
        payment,
    })
}

pub async fn status_history(
    pool: &DbPool,
    application_id: Uuid,
) -> Result<Vec<StatusHistoryEntry>, AppError> {
    let history = sqlx::query_as::<_, StatusHistoryEntry>(
        "SELECT * FROM application_status_history WHERE application_id = $1 ORDER BY created_at, id",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    Ok(history)
}

pub async fn list_letters(pool: &DbPool, application_id: Uuid) -> Result<Vec<Letter>, AppError> {
    let letters = sqlx::query_as::<_, Letter>(
        "SELECT * FROM letters WHERE application_id = $1 ORDER BY created_at DESC",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    Ok(letters)
}

/// Stamp approval and expiry dates on a freshly approved application.
pub async fn mark_approved(
    conn: &mut PgConnection,
    application_id: Uuid,
    expedited: bool,
    validity_days: i64,
) -> Result<Application, AppError> {
    let application = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET expedited = $1,
            approval_date = CURRENT_DATE,
            expiry_date = CURRENT_DATE + $2::INT,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(expedited)
    .bind(validity_days)
    .bind(application_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(application)
}

async fn set_admin_comments(
    conn: &mut PgConnection,
    application_id: Uuid,
    comments: &str,
) -> Result<Application, AppError> {
    let application = sqlx::query_as::<_, Application>(
        "UPDATE applications SET admin_comments = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(comments)
    .bind(application_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(application)
}

async fn insert_documents(
    conn: &mut PgConnection,
    application_id: Uuid,
    documents: &[DocumentInput],
) -> Result<(), AppError> {
    for document in documents {
        sqlx::query(
            r#"
            INSERT INTO documents (application_id, document_type, file_name, url)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(application_id)
        .bind(document.document_type.trim())
        .bind(document.file_name.trim())
        .bind(&document.url)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn upsert_payment(
    conn: &mut PgConnection,
    application_id: Uuid,
    payment: &PaymentInput,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO payments (application_id, amount_cents, reference)
        VALUES ($1, $2, $3)
        ON CONFLICT (application_id)
        DO UPDATE SET amount_cents = EXCLUDED.amount_cents,
                      reference = EXCLUDED.reference,
                      paid_at = NOW()
        "#,
    )
    .bind(application_id)
    .bind(payment.amount_cents)
    .bind(payment.reference.trim())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn notify_document_return(
    conn: &mut PgConnection,
    application: &Application,
    comments: &str,
    office_name: &str,
) -> Result<(), AppError> {
    let (name, email) = letter_service::applicant_contact(conn, application).await?;
    let text = format!(
        "Dear {name},\n\nYour application \"{}\" was returned during the document check.\n\n\
         Comments:\n{comments}\n\nPlease update the application and resubmit it.\n\n{office_name}",
        application.title
    );

    notification_service::queue_notification(
        conn,
        NewNotification::new(
            Some(application.id),
            email,
            format!("Documents incomplete: {}", application.title),
            text,
            None,
        ),
    )
    .await?;

    Ok(())
}
