//! User accounts, applicant profiles and bearer keys.
//!
//! Every request is authenticated with a bearer key. Keys are stored as
//! SHA-256 hashes and resolve to exactly one user, whose role decides what
//! the request may do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

text_enum! {
    /// Role of a user within the review office.
    pub enum Role {
        Applicant => "APPLICANT",
        Staff => "STAFF",
        Admin => "ADMIN",
        CommitteeMember => "COMMITTEE_MEMBER",
    }
}

text_enum! {
    /// Whether the account may authenticate.
    pub enum Validity {
        Active => "ACTIVE",
        Blocked => "BLOCKED",
    }
}

text_enum! {
    /// Applicant category, used for fee and eligibility checks by the office.
    pub enum ApplicantCategory {
        Student => "STUDENT",
        Staff => "STAFF",
        External => "EXTERNAL",
    }
}

/// Represents a user record from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[sqlx(try_from = "String")]
    pub validity: Validity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 1:1 extension of a user with the `APPLICANT` role.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Applicant {
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub category: ApplicantCategory,
    /// Link to the document proving the category (student ID, staff card, ...)
    pub evidence_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bearer key record from the `api_keys` table.
///
/// Only the SHA-256 hash of a key is stored; lookups go by `key_hash`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// Owner of the key
    pub user_id: Uuid,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,
}

/// Applicant profile supplied when creating an `APPLICANT` user.
#[derive(Debug, Deserialize)]
pub struct ApplicantProfileRequest {
    pub category: ApplicantCategory,
    pub evidence_url: Option<String>,
}

/// Request body for `POST /api/v1/users`.
///
/// # JSON Example
///
/// ```json
/// {
///   "full_name": "Dr. Amal Perera",
///   "email": "amal@example.org",
///   "role": "APPLICANT",
///   "applicant": { "category": "STAFF", "evidence_url": "https://files.example.org/id.pdf" }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub applicant: Option<ApplicantProfileRequest>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.full_name.trim().is_empty() {
            return Err(AppError::InvalidRequest("full_name is required".to_string()));
        }

        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(AppError::InvalidRequest(
                "email must be a valid address".to_string(),
            ));
        }

        match (self.role, &self.applicant) {
            (Role::Applicant, None) => Err(AppError::InvalidRequest(
                "applicant profile is required for APPLICANT users".to_string(),
            )),
            (role, Some(_)) if role != Role::Applicant => Err(AppError::InvalidRequest(
                "applicant profile is only accepted for APPLICANT users".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Request body for `PATCH /api/v1/users/{id}/validity`.
#[derive(Debug, Deserialize)]
pub struct UpdateValidityRequest {
    pub validity: Validity,
}

/// Response body for user endpoints.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub validity: Validity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<Applicant>,
    /// Bearer key, only present in the response that created the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            validity: user.validity,
            applicant: None,
            api_key: None,
            created_at: user.created_at,
        }
    }
}

impl UserResponse {
    pub fn with_applicant(mut self, applicant: Option<Applicant>) -> Self {
        self.applicant = applicant;
        self
    }

    /// Include the freshly generated key (only on creation).
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: Role, applicant: Option<ApplicantProfileRequest>) -> CreateUserRequest {
        CreateUserRequest {
            full_name: "Nimal Silva".to_string(),
            email: "nimal@example.org".to_string(),
            role,
            applicant,
        }
    }

    #[test]
    fn applicant_requires_profile() {
        assert!(request(Role::Applicant, None).validate().is_err());

        let profile = ApplicantProfileRequest {
            category: ApplicantCategory::Student,
            evidence_url: None,
        };
        assert!(request(Role::Applicant, Some(profile)).validate().is_ok());
    }

    #[test]
    fn profile_rejected_for_other_roles() {
        let profile = ApplicantProfileRequest {
            category: ApplicantCategory::External,
            evidence_url: None,
        };
        assert!(request(Role::Staff, Some(profile)).validate().is_err());
        assert!(request(Role::Admin, None).validate().is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut req = request(Role::Staff, None);
        req.email = "nobody".to_string();
        assert!(req.validate().is_err());

        req.email = "@example.org".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(*role));
        }
        assert!("applicant".parse::<Role>().is_err());
    }

    #[test]
    fn response_omits_key_unless_created() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Admin".to_string(),
            email: "admin@example.org".to_string(),
            role: Role::Admin,
            validity: Validity::Active,
            created_at: now,
            updated_at: now,
        };

        let plain = serde_json::to_value(UserResponse::from(user.clone())).unwrap();
        assert!(plain.get("api_key").is_none());

        let created =
            serde_json::to_value(UserResponse::from(user).with_api_key("k".repeat(64))).unwrap();
        assert_eq!(created["api_key"].as_str().map(str::len), Some(64));
        assert_eq!(created["role"], "ADMIN");
    }
}
