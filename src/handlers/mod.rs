//! HTTP request handlers.
//!
//! Handlers extract the request, check the caller's role where the service
//! does not, delegate to `services` and shape the JSON response.

pub mod applications;
pub mod committees;
pub mod health;
pub mod meetings;
pub mod notifications;
pub mod reviews;
pub mod users;
