//! Notification outbox HTTP handlers (admin).
//!
//! - GET /api/v1/notifications - List notifications (`?status=FAILED`)
//! - POST /api/v1/notifications/dispatch - Deliver pending notifications now

use crate::{
    db::AppState,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        notification::{DispatchSummary, Notification, NotificationStatus},
        user::Role,
    },
    services::notification_service,
};
use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub status: Option<NotificationStatus>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    auth.require(&[Role::Admin])?;

    Ok(Json(
        notification_service::list_notifications(&state.pool, query.status).await?,
    ))
}

/// Deliver queued notifications and retry failed ones synchronously.
///
/// # Response (200 OK)
///
/// ```json
/// { "attempted": 3, "sent": 2, "failed": 1, "skipped": false }
/// ```
pub async fn dispatch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DispatchSummary>, AppError> {
    auth.require(&[Role::Admin])?;

    let summary = notification_service::dispatch_pending(&state.pool, &state.config).await?;

    Ok(Json(summary))
}
