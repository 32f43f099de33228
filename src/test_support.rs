//! Seed rows for database-backed tests.
//!
//! Rows are inserted directly so a test can start from any workflow status
//! without replaying the whole application lifecycle.

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::tests::sample_config;
use crate::db::AppState;
use crate::middleware::auth::AuthContext;
use crate::models::application::Application;
use crate::models::committee::{Committee, CommitteeType, MemberRole};
use crate::models::meeting::{CommitteeMeeting, Decision};
use crate::models::user::{Role, User};
use crate::workflow::ApplicationStatus;

pub fn state(pool: &PgPool) -> AppState {
    AppState::new(pool.clone(), sample_config())
}

pub fn auth(user: &User) -> AuthContext {
    AuthContext::from(user.clone())
}

pub async fn user(pool: &PgPool, role: Role) -> User {
    let id = Uuid::new_v4();
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, full_name, email, role) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(id)
    .bind(format!("{role} user"))
    .bind(format!("{id}@example.org"))
    .bind(role.as_str())
    .fetch_one(pool)
    .await
    .expect("user inserted")
}

/// `APPLICANT` user with its applicant profile.
pub async fn applicant(pool: &PgPool) -> User {
    let user = user(pool, Role::Applicant).await;
    sqlx::query("INSERT INTO applicants (user_id, category) VALUES ($1, 'STUDENT')")
        .bind(user.id)
        .execute(pool)
        .await
        .expect("applicant profile inserted");
    user
}

pub async fn committee(pool: &PgPool, committee_type: CommitteeType) -> Committee {
    sqlx::query_as::<_, Committee>(
        "INSERT INTO committees (name, committee_type) VALUES ($1, $2) RETURNING *",
    )
    .bind(format!("{committee_type} {}", Uuid::new_v4()))
    .bind(committee_type.as_str())
    .fetch_one(pool)
    .await
    .expect("committee inserted")
}

pub async fn seat(pool: &PgPool, committee_id: Uuid, user_id: Uuid, role: MemberRole) {
    sqlx::query("INSERT INTO committee_members (committee_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(committee_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .await
        .expect("seat inserted");
}

/// Application at `status` with one document and a payment.
pub async fn application(
    pool: &PgPool,
    applicant_id: Uuid,
    status: ApplicationStatus,
    committee_id: Option<Uuid>,
) -> Application {
    let application = sqlx::query_as::<_, Application>(
        r#"
        INSERT INTO applications (applicant_id, title, research_type, status, committee_id)
        VALUES ($1, 'Sleep and memory in adolescents', 'HUMAN_SUBJECTS', $2, $3)
        RETURNING *
        "#,
    )
    .bind(applicant_id)
    .bind(status.as_str())
    .bind(committee_id)
    .fetch_one(pool)
    .await
    .expect("application inserted");

    sqlx::query(
        r#"
        INSERT INTO documents (application_id, document_type, file_name, url)
        VALUES ($1, 'PROPOSAL', 'proposal.pdf', 'https://files.example.org/proposal.pdf')
        "#,
    )
    .bind(application.id)
    .execute(pool)
    .await
    .expect("document inserted");

    sqlx::query("INSERT INTO payments (application_id, amount_cents, reference) VALUES ($1, 5000, 'RCPT-1')")
        .bind(application.id)
        .execute(pool)
        .await
        .expect("payment inserted");

    application
}

/// Scheduled meeting with the given applications and decisions on its agenda.
///
/// Application statuses are left alone; seed them to match the decisions.
pub async fn meeting(
    pool: &PgPool,
    committee_id: Uuid,
    agenda: &[(Uuid, Decision)],
) -> CommitteeMeeting {
    let meeting = sqlx::query_as::<_, CommitteeMeeting>(
        "INSERT INTO committee_meetings (committee_id, meeting_date) VALUES ($1, NOW()) RETURNING *",
    )
    .bind(committee_id)
    .fetch_one(pool)
    .await
    .expect("meeting inserted");

    for (application_id, decision) in agenda {
        sqlx::query(
            "INSERT INTO meeting_applications (meeting_id, application_id, decision) VALUES ($1, $2, $3)",
        )
        .bind(meeting.id)
        .bind(application_id)
        .bind(decision.as_str())
        .execute(pool)
        .await
        .expect("agenda entry inserted");
    }

    meeting
}

pub async fn status_of(pool: &PgPool, application_id: Uuid) -> ApplicationStatus {
    let status: String = sqlx::query_scalar("SELECT status FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_one(pool)
        .await
        .expect("application exists");
    status.parse().expect("known status")
}

pub async fn history_count(pool: &PgPool, application_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM application_status_history WHERE application_id = $1")
        .bind(application_id)
        .fetch_one(pool)
        .await
        .expect("history counted")
}
