//! Decision letters and the applicant notifications that carry them.
//!
//! Rendering is pure; [`issue_letter`] persists the letter and queues the
//! notification on the caller's transaction so both land together with the
//! status change that caused them.

use chrono::NaiveDate;
use sqlx::PgConnection;

use crate::error::AppError;
use crate::models::application::Application;
use crate::models::letter::{Letter, LetterKind};
use crate::models::notification::{NewNotification, Notification};
use crate::services::notification_service;

/// Everything a letter mentions.
#[derive(Debug, Clone)]
pub struct LetterContext<'a> {
    pub application: &'a Application,
    pub applicant_name: &'a str,
    pub committee_name: Option<&'a str>,
    pub comments: Option<&'a str>,
    pub office_name: &'a str,
    pub issued_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLetter {
    pub subject: String,
    pub body: String,
}

pub fn subject_for(kind: LetterKind, title: &str) -> String {
    match kind {
        LetterKind::Approval => format!("Ethics approval granted: {title}"),
        LetterKind::ExpeditedApproval => format!("Expedited ethics approval granted: {title}"),
        LetterKind::Rejection => format!("Ethics review decision: {title}"),
        LetterKind::Revision => format!("Revisions requested: {title}"),
    }
}

/// Render the letter text for `kind`.
pub fn render_letter(kind: LetterKind, ctx: &LetterContext<'_>) -> RenderedLetter {
    let app = ctx.application;
    let committee = ctx.committee_name.unwrap_or("Ethics Review Committee");

    let decision_paragraph = match kind {
        LetterKind::Approval => format!(
            "We are pleased to inform you that the {committee} has approved the above application.{}",
            validity_sentence(app)
        ),
        LetterKind::ExpeditedApproval => format!(
            "We are pleased to inform you that the above application has been approved through the expedited review procedure.{}",
            validity_sentence(app)
        ),
        LetterKind::Rejection => format!(
            "After careful consideration, the {committee} has decided that the above application cannot be approved."
        ),
        LetterKind::Revision => "The above application requires revisions before a decision can be made. \
             Please address the comments below and resubmit the application."
            .to_string(),
    };

    let mut paragraphs = vec![
        format!("{}\n{}", ctx.office_name, ctx.issued_on.format("%d %B %Y")),
        format!("Dear {},", ctx.applicant_name),
        format!("Application reference: {}\nTitle: {}", app.id, app.title),
        decision_paragraph,
    ];

    if let Some(comments) = ctx.comments.map(str::trim).filter(|c| !c.is_empty()) {
        paragraphs.push(format!("Comments:\n{comments}"));
    }

    if matches!(kind, LetterKind::Approval | LetterKind::ExpeditedApproval) {
        paragraphs.push(
            "Any amendment to the approved protocol must be submitted for review before it is implemented."
                .to_string(),
        );
    }

    paragraphs.push(format!("Sincerely,\n{}", ctx.office_name));

    RenderedLetter {
        subject: subject_for(kind, &app.title),
        body: paragraphs.join("\n\n"),
    }
}

fn validity_sentence(app: &Application) -> String {
    match (app.approval_date, app.expiry_date) {
        (Some(from), Some(until)) => format!(
            " The approval is valid from {} until {}.",
            from.format("%d %B %Y"),
            until.format("%d %B %Y")
        ),
        _ => String::new(),
    }
}

/// Short cover message for the notification carrying a letter.
pub fn cover_message(
    kind: LetterKind,
    applicant_name: &str,
    title: &str,
    office_name: &str,
) -> String {
    let outcome = match kind {
        LetterKind::Approval | LetterKind::ExpeditedApproval => "has been approved",
        LetterKind::Rejection => "has not been approved",
        LetterKind::Revision => "has been returned for revision",
    };
    format!(
        "Dear {applicant_name},\n\nYour application \"{title}\" {outcome}. \
         The attached letter contains the details.\n\n{office_name}"
    )
}

/// Applicant name and email for an application.
pub async fn applicant_contact(
    conn: &mut PgConnection,
    application: &Application,
) -> Result<(String, String), AppError> {
    sqlx::query_as::<_, (String, String)>("SELECT full_name, email FROM users WHERE id = $1")
        .bind(application.applicant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Applicant"))
}

/// Render, persist and queue a letter for the application's applicant.
pub async fn issue_letter(
    conn: &mut PgConnection,
    application: &Application,
    kind: LetterKind,
    committee_name: Option<&str>,
    comments: Option<&str>,
    office_name: &str,
) -> Result<(Letter, Notification), AppError> {
    let (applicant_name, applicant_email) = applicant_contact(conn, application).await?;

    let ctx = LetterContext {
        application,
        applicant_name: &applicant_name,
        committee_name,
        comments,
        office_name,
        issued_on: chrono::Utc::now().date_naive(),
    };
    let rendered = render_letter(kind, &ctx);

    let letter = sqlx::query_as::<_, Letter>(
        r#"
        INSERT INTO letters (application_id, kind, subject, body)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(application.id)
    .bind(kind.as_str())
    .bind(&rendered.subject)
    .bind(&rendered.body)
    .fetch_one(&mut *conn)
    .await?;

    let notification = notification_service::queue_notification(
        conn,
        NewNotification::new(
            Some(application.id),
            applicant_email,
            rendered.subject,
            cover_message(kind, &applicant_name, &application.title, office_name),
            Some(letter.id),
        ),
    )
    .await?;

    tracing::info!(
        application_id = %application.id,
        letter_id = %letter.id,
        kind = %kind,
        "letter issued"
    );

    Ok((letter, notification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::ResearchType;
    use crate::workflow::ApplicationStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn application(approved: bool) -> Application {
        let now = Utc::now();
        Application {
            id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            applicant_id: Uuid::new_v4(),
            title: "Sleep patterns of night-shift nurses".to_string(),
            research_type: ResearchType::HumanSubjects,
            status: ApplicationStatus::Approved,
            committee_id: None,
            expedited: false,
            submission_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            approval_date: approved.then(|| NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
            expiry_date: approved.then(|| NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
            admin_comments: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn context<'a>(app: &'a Application, comments: Option<&'a str>) -> LetterContext<'a> {
        LetterContext {
            application: app,
            applicant_name: "Dr. Amal Perera",
            committee_name: Some("Clinical Trials Sub-Committee"),
            comments,
            office_name: "ERC Office",
            issued_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        }
    }

    #[test]
    fn approval_letter_states_validity_period() {
        let app = application(true);
        let letter = render_letter(LetterKind::Approval, &context(&app, None));

        assert_eq!(
            letter.subject,
            "Ethics approval granted: Sleep patterns of night-shift nurses"
        );
        assert!(letter.body.starts_with("ERC Office\n01 March 2025"));
        assert!(letter.body.contains("Dear Dr. Amal Perera,"));
        assert!(letter.body.contains("Clinical Trials Sub-Committee has approved"));
        assert!(letter.body.contains("valid from 01 March 2025 until 01 March 2026"));
        assert!(letter.body.contains("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!letter.body.contains("Comments:"));
    }

    #[test]
    fn expedited_letter_mentions_procedure() {
        let app = application(true);
        let letter = render_letter(LetterKind::ExpeditedApproval, &context(&app, None));
        assert!(letter.subject.starts_with("Expedited ethics approval granted"));
        assert!(letter.body.contains("expedited review procedure"));
    }

    #[test]
    fn revision_letter_carries_comments() {
        let app = application(false);
        let letter = render_letter(
            LetterKind::Revision,
            &context(&app, Some("  Clarify the consent procedure.  ")),
        );
        assert!(letter.body.contains("Comments:\nClarify the consent procedure."));
        assert!(letter.body.contains("resubmit the application"));
        assert!(!letter.body.contains("amendment"));
    }

    #[test]
    fn rejection_falls_back_to_default_committee_name() {
        let app = application(false);
        let mut ctx = context(&app, Some(""));
        ctx.committee_name = None;
        let letter = render_letter(LetterKind::Rejection, &ctx);
        assert!(letter.body.contains("the Ethics Review Committee has decided"));
        assert!(!letter.body.contains("Comments:"));
        assert!(letter.body.ends_with("Sincerely,\nERC Office"));
    }

    #[test]
    fn cover_message_summarizes_outcome() {
        let message = cover_message(LetterKind::Rejection, "Nimal", "Study A", "ERC Office");
        assert!(message.contains("\"Study A\" has not been approved"));
        assert!(message.starts_with("Dear Nimal,"));
        assert!(message.ends_with("ERC Office"));
    }
}
