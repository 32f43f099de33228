//! Notification models for the applicant mail outbox.
//!
//! # Notification Flow
//!
//! 1. A status change that concerns the applicant queues a `Notification`
//!    row inside the same database transaction as the change itself
//! 2. After commit, the dispatcher posts a signed `RelayMessage` to the mail
//!    relay and records the outcome on the row
//! 3. Rows that failed stay visible to admins and can be dispatched again
//!
//! # Security
//!
//! - Relay requests are signed using HMAC-SHA256 over the JSON body
//! - The signature travels in the `X-Signature` header as `sha256=<hex>`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::letter::Letter;

text_enum! {
    pub enum NotificationStatus {
        Queued => "QUEUED",
        /// Claimed by a dispatcher that is talking to the relay
        Sending => "SENDING",
        Sent => "SENT",
        Failed => "FAILED",
    }
}

/// Notification record.
///
/// # Database Table
///
/// Maps to the `notifications` table. Each row tracks the message content,
/// the optional letter attachment and every delivery attempt's outcome.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub letter_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub status: NotificationStatus,
    pub attempts: i32,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Notification about to be queued.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub application_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub text_body: String,
    pub letter_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        application_id: Option<Uuid>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        text_body: impl Into<String>,
        letter_id: Option<Uuid>,
    ) -> Self {
        Self {
            application_id,
            recipient: recipient.into(),
            subject: subject.into(),
            text_body: text_body.into(),
            letter_id,
        }
    }

    /// HTML rendition of the plain-text body.
    ///
    /// Paragraphs are separated by blank lines; markup characters are escaped.
    pub fn html_body(&self) -> String {
        self.text_body
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("<p>{}</p>", escape_html(p.trim()).replace('\n', "<br>")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Message posted to the mail relay.
///
/// # Example
///
/// ```json
/// {
///   "message_id": "550e8400-e29b-41d4-a716-446655440000",
///   "to": "applicant@example.org",
///   "subject": "Ethics approval granted",
///   "text": "Dear ...",
///   "html": "<p>Dear ...</p>",
///   "attachments": [
///     { "filename": "approval-550e8400.txt", "content_type": "text/plain", "content": "..." }
///   ]
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayMessage {
    pub message_id: Uuid,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<RelayAttachment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

impl From<&Letter> for RelayAttachment {
    fn from(letter: &Letter) -> Self {
        Self {
            filename: letter.file_name(),
            content_type: "text/plain; charset=utf-8".to_string(),
            content: letter.body.clone(),
        }
    }
}

impl RelayMessage {
    pub fn new(notification: &Notification, letter: Option<&Letter>) -> Self {
        Self {
            message_id: notification.id,
            to: notification.recipient.clone(),
            subject: notification.subject.clone(),
            text: notification.text_body.clone(),
            html: notification.html_body.clone(),
            attachments: letter.map(RelayAttachment::from).into_iter().collect(),
        }
    }
}

/// Response body for `POST /api/v1/notifications/dispatch`.
#[derive(Debug, Default, Serialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Relay not configured; nothing was attempted.
    pub skipped: bool,
}
