//! Data models representing database entities and API payloads.
//!
//! Enumerated columns are stored as TEXT and parsed on read, so an unknown
//! value in the database surfaces as a decode error instead of leaking
//! through as a free-form string.

/// Users, applicant profiles and bearer keys
pub mod user;
/// Applications, their documents, payment and status history
pub mod application;
/// Committees and their members
pub mod committee;
/// Committee meetings and per-application decisions
pub mod meeting;
/// Reviewer assignments and recommendations
pub mod review;
/// Decision letters
pub mod letter;
/// Applicant notification outbox
pub mod notification;

/// A TEXT column or request field held a value outside its enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
