//! Health check endpoint for service monitoring.

use crate::{db::DbPool, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    /// Outstanding notifications waiting for the mail relay
    pub queued_notifications: i64,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health` (public).
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "queued_notifications": 0,
///   "timestamp": "2025-03-14T09:30:00Z"
/// }
/// ```
///
/// An unreachable database yields the standard 500 error response.
pub async fn health_check(State(pool): State<DbPool>) -> Result<Json<HealthResponse>, AppError> {
    let queued_notifications: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE status = 'QUEUED'")
            .fetch_one(&pool)
            .await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        queued_notifications,
        timestamp: Utc::now(),
    }))
}
