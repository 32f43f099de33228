//! HTTP middleware components.

/// Bearer key authentication middleware
pub mod auth;
