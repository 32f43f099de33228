//! Decision letters issued to applicants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::meeting::Decision;

text_enum! {
    pub enum LetterKind {
        Approval => "APPROVAL",
        ExpeditedApproval => "EXPEDITED_APPROVAL",
        Rejection => "REJECTION",
        Revision => "REVISION",
    }
}

impl LetterKind {
    /// Letter issued when a ratified meeting decision is finalized.
    ///
    /// `PENDING` has no letter because it can never be ratified.
    pub fn for_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Approved => Some(LetterKind::Approval),
            Decision::Rejected => Some(LetterKind::Rejection),
            Decision::Revise => Some(LetterKind::Revision),
            Decision::Pending => None,
        }
    }
}

/// Represents a letter record from the `letters` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Letter {
    pub id: Uuid,
    pub application_id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: LetterKind,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Letter {
    /// File name used when the letter travels as an email attachment.
    pub fn file_name(&self) -> String {
        let short_id = self.application_id.simple().to_string();
        format!(
            "{}-{}.txt",
            self.kind.as_str().to_lowercase().replace('_', "-"),
            &short_id[..8]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_decision_has_no_letter() {
        assert_eq!(LetterKind::for_decision(Decision::Pending), None);
        assert_eq!(
            LetterKind::for_decision(Decision::Revise),
            Some(LetterKind::Revision)
        );
    }

    #[test]
    fn file_name_uses_kind_and_application_prefix() {
        let application_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let letter = Letter {
            id: Uuid::new_v4(),
            application_id,
            kind: LetterKind::ExpeditedApproval,
            subject: String::new(),
            body: String::new(),
            created_at: Utc::now(),
        };
        assert_eq!(letter.file_name(), "expedited-approval-550e8400.txt");
    }
}
