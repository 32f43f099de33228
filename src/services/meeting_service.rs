//! Meeting service - scheduling, decisions and ratification.
//!
//! # Atomicity Guarantees
//!
//! Scheduling, ratification and cancellation each run in one PostgreSQL
//! transaction. The meeting row is locked first (`FOR UPDATE`), then each
//! application row through the workflow, so two admins ratifying the same
//! meeting serialize instead of issuing duplicate letters.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::{AppState, DbPool};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::application::Application;
use crate::models::committee::{Committee, MemberRole};
use crate::models::letter::LetterKind;
use crate::models::meeting::{
    CommitteeMeeting, Decision, MeetingApplication, MeetingDetailResponse, MeetingStatus,
    RatificationResponse, RatifiedApplication, RatifyRequest, RecordDecisionRequest,
    ScheduleMeetingRequest,
};
use crate::models::user::Role;
use crate::services::{application_service, committee_service, letter_service, notification_service};
use crate::workflow::{self, WorkflowEvent};

/// Schedule a meeting for one committee.
///
/// # Process
///
/// 1. Insert the meeting (`SCHEDULED`)
/// 2. For every application, in id order: verify it is assigned to this
///    committee, move it to `SCHEDULED_FOR_MEETING` and link it with a
///    `PENDING` decision
/// 3. Commit (or rollback if any application is not eligible)
///
/// Applications are locked in id order so that overlapping requests cannot
/// deadlock on each other.
pub async fn schedule_meeting(
    pool: &DbPool,
    request: ScheduleMeetingRequest,
    actor_id: Uuid,
) -> Result<MeetingDetailResponse, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;

    let committee = sqlx::query_as::<_, Committee>("SELECT * FROM committees WHERE id = $1")
        .bind(request.committee_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Committee"))?;

    let meeting = sqlx::query_as::<_, CommitteeMeeting>(
        r#"
        INSERT INTO committee_meetings (committee_id, meeting_date, location)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(committee.id)
    .bind(request.meeting_date)
    .bind(request.location.as_deref().map(str::trim))
    .fetch_one(&mut *tx)
    .await?;

    let mut applications = Vec::with_capacity(request.application_ids.len());
    for application_id in lock_order(&request.application_ids) {
        let application = workflow::transition_application(
            &mut tx,
            application_id,
            WorkflowEvent::ScheduleForMeeting,
            actor_id,
            None,
        )
        .await?;

        if application.committee_id != Some(committee.id) {
            return Err(AppError::RuleViolation(format!(
                "application {} is not assigned to committee {}",
                application.id, committee.name
            )));
        }

        let entry = sqlx::query_as::<_, MeetingApplication>(
            r#"
            INSERT INTO meeting_applications (meeting_id, application_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(meeting.id)
        .bind(application.id)
        .fetch_one(&mut *tx)
        .await?;
        applications.push(entry);
    }

    tx.commit().await?;

    tracing::info!(
        meeting_id = %meeting.id,
        committee_id = %committee.id,
        applications = applications.len(),
        "meeting scheduled"
    );

    Ok(MeetingDetailResponse {
        meeting,
        applications,
    })
}

pub async fn get_meeting(pool: &DbPool, meeting_id: Uuid) -> Result<MeetingDetailResponse, AppError> {
    let meeting = sqlx::query_as::<_, CommitteeMeeting>(
        "SELECT * FROM committee_meetings WHERE id = $1",
    )
    .bind(meeting_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Meeting"))?;

    let applications = sqlx::query_as::<_, MeetingApplication>(
        "SELECT * FROM meeting_applications WHERE meeting_id = $1 ORDER BY id",
    )
    .bind(meeting_id)
    .fetch_all(pool)
    .await?;

    Ok(MeetingDetailResponse {
        meeting,
        applications,
    })
}

pub async fn list_meetings(
    pool: &DbPool,
    committee_id: Option<Uuid>,
) -> Result<Vec<CommitteeMeeting>, AppError> {
    let meetings = sqlx::query_as::<_, CommitteeMeeting>(
        r#"
        SELECT * FROM committee_meetings
        WHERE ($1::UUID IS NULL OR committee_id = $1)
        ORDER BY meeting_date DESC
        "#,
    )
    .bind(committee_id)
    .fetch_all(pool)
    .await?;
    Ok(meetings)
}

/// Record (or change) the committee's decision on one application.
///
/// Allowed for admins and for the chair of the meeting's committee, while
/// the meeting is `SCHEDULED` and the decision is not yet ratified.
pub async fn record_decision(
    pool: &DbPool,
    auth: &AuthContext,
    meeting_id: Uuid,
    application_id: Uuid,
    request: RecordDecisionRequest,
) -> Result<MeetingApplication, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;
    let meeting = lock_meeting(&mut tx, meeting_id).await?;

    if auth.role != Role::Admin {
        let seat =
            committee_service::member_role(&mut tx, meeting.committee_id, auth.user_id).await?;
        if seat != Some(MemberRole::Chair) {
            return Err(AppError::Forbidden(
                "only admins or the committee chair may record decisions".to_string(),
            ));
        }
    }

    ensure_scheduled(&meeting)?;

    let entry = lock_entry(&mut tx, meeting_id, application_id).await?;
    if entry.ratified {
        return Err(AppError::Conflict(
            "the decision has already been ratified".to_string(),
        ));
    }

    workflow::transition_application(
        &mut tx,
        application_id,
        WorkflowEvent::RecordDecision,
        auth.user_id,
        request.comments.as_deref(),
    )
    .await?;

    let updated = sqlx::query_as::<_, MeetingApplication>(
        r#"
        UPDATE meeting_applications
        SET decision = $1,
            comments = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(request.decision.as_str())
    .bind(request.comments)
    .bind(entry.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        meeting_id = %meeting_id,
        application_id = %application_id,
        decision = %updated.decision,
        "meeting decision recorded"
    );

    Ok(updated)
}

/// Pick the meeting entries a ratification request covers.
///
/// With explicit ids every id must be on the meeting, decided and not yet
/// ratified. Without ids, every decided and unratified entry is taken.
pub fn select_for_ratification(
    entries: &[MeetingApplication],
    requested: Option<&[Uuid]>,
) -> Result<Vec<MeetingApplication>, AppError> {
    let selected: Vec<MeetingApplication> = match requested {
        Some(ids) => {
            let mut selected = Vec::with_capacity(ids.len());
            for id in ids {
                let entry = entries
                    .iter()
                    .find(|e| e.application_id == *id)
                    .ok_or(AppError::NotFound("Meeting application"))?;
                if entry.ratified {
                    return Err(AppError::Conflict(format!(
                        "the decision on application {id} is already ratified"
                    )));
                }
                if entry.decision == Decision::Pending {
                    return Err(AppError::RuleViolation(format!(
                        "application {id} has no recorded decision"
                    )));
                }
                if !selected.iter().any(|s: &MeetingApplication| s.id == entry.id) {
                    selected.push(entry.clone());
                }
            }
            selected
        }
        None => entries
            .iter()
            .filter(|e| !e.ratified && e.decision != Decision::Pending)
            .cloned()
            .collect(),
    };

    if selected.is_empty() {
        return Err(AppError::RuleViolation(
            "there are no decided applications to ratify".to_string(),
        ));
    }

    Ok(selected)
}

/// Entries still unratified once `selected` is ratified.
///
/// `selected` must come from [`select_for_ratification`] over the same
/// entries, so it holds only unratified entries and no repeats.
pub fn unratified_after(entries: &[MeetingApplication], selected: &[MeetingApplication]) -> usize {
    entries
        .iter()
        .filter(|e| !e.ratified && !selected.iter().any(|s| s.id == e.id))
        .count()
}

/// Ratify meeting decisions.
///
/// # Process (per ratified application)
///
/// 1. Apply `Ratify(decision)`: APPROVED / REJECTED / RETURNED_FOR_RESUBMISSION
/// 2. Stamp approval and expiry dates on approvals
/// 3. Issue the decision letter and queue the applicant notification
/// 4. Mark the meeting entry ratified
///
/// The meeting becomes `COMPLETED` once every entry is ratified. Everything
/// commits together; queued mail is dispatched after commit.
pub async fn ratify_decisions(
    state: &AppState,
    auth: &AuthContext,
    meeting_id: Uuid,
    request: RatifyRequest,
) -> Result<RatificationResponse, AppError> {
    auth.require(&[Role::Admin])?;

    let mut tx = state.pool.begin().await?;
    let meeting = lock_meeting(&mut tx, meeting_id).await?;
    ensure_scheduled(&meeting)?;

    let committee = sqlx::query_as::<_, Committee>("SELECT * FROM committees WHERE id = $1")
        .bind(meeting.committee_id)
        .fetch_one(&mut *tx)
        .await?;

    let entries = sqlx::query_as::<_, MeetingApplication>(
        "SELECT * FROM meeting_applications WHERE meeting_id = $1 ORDER BY id FOR UPDATE",
    )
    .bind(meeting_id)
    .fetch_all(&mut *tx)
    .await?;

    let selected = select_for_ratification(&entries, request.application_ids.as_deref())?;

    let mut ratified = Vec::with_capacity(selected.len());
    for entry in &selected {
        let outcome = ratify_entry(state, &mut tx, auth, &committee, entry).await?;
        ratified.push(outcome);
    }

    let remaining = unratified_after(&entries, &selected);
    let meeting_status = if remaining == 0 {
        sqlx::query("UPDATE committee_meetings SET status = $1 WHERE id = $2")
            .bind(MeetingStatus::Completed.as_str())
            .bind(meeting_id)
            .execute(&mut *tx)
            .await?;
        MeetingStatus::Completed
    } else {
        meeting.status
    };

    tx.commit().await?;

    tracing::info!(
        meeting_id = %meeting_id,
        ratified = ratified.len(),
        remaining,
        meeting_status = %meeting_status,
        "meeting decisions ratified"
    );

    notification_service::spawn_dispatch(state);

    Ok(RatificationResponse {
        meeting_id,
        meeting_status,
        ratified,
    })
}

async fn ratify_entry(
    state: &AppState,
    conn: &mut PgConnection,
    auth: &AuthContext,
    committee: &Committee,
    entry: &MeetingApplication,
) -> Result<RatifiedApplication, AppError> {
    let mut application: Application = workflow::transition_application(
        conn,
        entry.application_id,
        WorkflowEvent::Ratify(entry.decision),
        auth.user_id,
        entry.comments.as_deref(),
    )
    .await?;

    if entry.decision == Decision::Approved {
        application = application_service::mark_approved(
            conn,
            application.id,
            false,
            state.config.approval_validity_days,
        )
        .await?;
    }

    let kind = LetterKind::for_decision(entry.decision)
        .ok_or_else(|| AppError::RuleViolation("a PENDING decision cannot be ratified".to_string()))?;

    let (letter, notification) = letter_service::issue_letter(
        conn,
        &application,
        kind,
        Some(&committee.name),
        entry.comments.as_deref(),
        &state.config.erc_office_name,
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE meeting_applications
        SET ratified = true,
            ratified_at = NOW(),
            ratified_by = $1
        WHERE id = $2
        "#,
    )
    .bind(auth.user_id)
    .bind(entry.id)
    .execute(&mut *conn)
    .await?;

    Ok(RatifiedApplication {
        application_id: application.id,
        decision: entry.decision,
        status: application.status,
        letter_id: letter.id,
        notification_id: notification.id,
    })
}

/// Cancel a scheduled meeting and return its applications to committee review.
///
/// Meetings with ratified decisions cannot be cancelled.
pub async fn cancel_meeting(
    pool: &DbPool,
    auth: &AuthContext,
    meeting_id: Uuid,
) -> Result<CommitteeMeeting, AppError> {
    auth.require(&[Role::Admin])?;

    let mut tx = pool.begin().await?;
    let meeting = lock_meeting(&mut tx, meeting_id).await?;
    ensure_scheduled(&meeting)?;

    let committee = sqlx::query_as::<_, Committee>("SELECT * FROM committees WHERE id = $1")
        .bind(meeting.committee_id)
        .fetch_one(&mut *tx)
        .await?;

    let entries = sqlx::query_as::<_, MeetingApplication>(
        "SELECT * FROM meeting_applications WHERE meeting_id = $1 FOR UPDATE",
    )
    .bind(meeting_id)
    .fetch_all(&mut *tx)
    .await?;

    if entries.iter().any(|e| e.ratified) {
        return Err(AppError::RuleViolation(
            "a meeting with ratified decisions cannot be cancelled".to_string(),
        ));
    }

    for entry in &entries {
        workflow::transition_application(
            &mut tx,
            entry.application_id,
            WorkflowEvent::CancelMeeting(committee.committee_type),
            auth.user_id,
            Some("meeting cancelled"),
        )
        .await?;
    }

    let cancelled = sqlx::query_as::<_, CommitteeMeeting>(
        "UPDATE committee_meetings SET status = $1 WHERE id = $2 RETURNING *",
    )
    .bind(MeetingStatus::Cancelled.as_str())
    .bind(meeting_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(meeting_id = %meeting_id, applications = entries.len(), "meeting cancelled");

    Ok(cancelled)
}

/// Sorted copy of `ids`; rows are always locked in this order.
fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered
}

async fn lock_meeting(
    conn: &mut PgConnection,
    meeting_id: Uuid,
) -> Result<CommitteeMeeting, AppError> {
    sqlx::query_as::<_, CommitteeMeeting>(
        "SELECT * FROM committee_meetings WHERE id = $1 FOR UPDATE",
    )
    .bind(meeting_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Meeting"))
}

async fn lock_entry(
    conn: &mut PgConnection,
    meeting_id: Uuid,
    application_id: Uuid,
) -> Result<MeetingApplication, AppError> {
    sqlx::query_as::<_, MeetingApplication>(
        "SELECT * FROM meeting_applications WHERE meeting_id = $1 AND application_id = $2 FOR UPDATE",
    )
    .bind(meeting_id)
    .bind(application_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Meeting application"))
}

fn ensure_scheduled(meeting: &CommitteeMeeting) -> Result<(), AppError> {
    match meeting.status {
        MeetingStatus::Scheduled => Ok(()),
        MeetingStatus::Completed => Err(AppError::Conflict(
            "the meeting is already completed".to_string(),
        )),
        MeetingStatus::Cancelled => Err(AppError::RuleViolation(
            "the meeting was cancelled".to_string(),
        )),
    }
}
