//! Business logic services.
//!
//! Services hold the review office's rules, separated from HTTP handlers.
//! Status changes and their side effects share one database transaction.

pub mod application_service;
pub mod committee_service;
pub mod letter_service;
pub mod meeting_service;
pub mod notification_service;
pub mod review_service;
pub mod user_service;
