//! Persisting status transitions.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::application::Application;
use crate::workflow::WorkflowEvent;

/// Lock an application row and move it through `event`.
///
/// # Process
///
/// 1. Lock the application row (`FOR UPDATE`)
/// 2. Ask the transition table for the next status
/// 3. Update the row
/// 4. Append an `application_status_history` entry
///
/// Runs on the caller's connection, normally an open transaction, so the
/// status change commits or rolls back together with the caller's other
/// writes.
///
/// # Errors
///
/// - `NotFound`: application doesn't exist
/// - `InvalidTransition`: the current status refuses `event`
/// - `Database`: database error occurred
pub async fn transition_application(
    conn: &mut PgConnection,
    application_id: Uuid,
    event: WorkflowEvent,
    actor_id: Uuid,
    comment: Option<&str>,
) -> Result<Application, AppError> {
    let current = sqlx::query_as::<_, Application>(
        "SELECT * FROM applications WHERE id = $1 FOR UPDATE",
    )
    .bind(application_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Application"))?;

    let next = current.status.apply(event)?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET status = $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(next.as_str())
    .bind(application_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO application_status_history (
            application_id,
            from_status,
            to_status,
            event,
            actor_id,
            comment
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(application_id)
    .bind(current.status.as_str())
    .bind(next.as_str())
    .bind(event.name())
    .bind(actor_id)
    .bind(comment)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        application_id = %application_id,
        from = %current.status,
        to = %next,
        event = event.name(),
        actor_id = %actor_id,
        "application status changed"
    );

    if next.is_terminal() {
        tracing::info!(application_id = %application_id, status = %next, "application reached a final decision");
    }

    Ok(updated)
}
