//! Notification service: queueing applicant mail and delivering it to the
//! mail relay.
//!
//! Rows are queued on the caller's transaction. Delivery happens afterwards,
//! either spawned right after commit or on demand by an administrator, and
//! never changes the outcome of the request that queued the mail.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{AppState, DbPool};
use crate::error::AppError;
use crate::models::letter::Letter;
use crate::models::notification::{
    DispatchSummary, NewNotification, Notification, NotificationStatus, RelayMessage,
};

type HmacSha256 = Hmac<Sha256>;

/// Notifications are given up on after this many failed attempts.
pub const MAX_ATTEMPTS: i32 = 5;

/// Insert a `QUEUED` notification.
pub async fn queue_notification(
    conn: &mut PgConnection,
    notification: NewNotification,
) -> Result<Notification, AppError> {
    let html_body = notification.html_body();

    let queued = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (application_id, recipient, subject, text_body, html_body, letter_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(notification.application_id)
    .bind(&notification.recipient)
    .bind(&notification.subject)
    .bind(&notification.text_body)
    .bind(&html_body)
    .bind(notification.letter_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(queued)
}

/// List notifications, newest first, optionally filtered by status.
pub async fn list_notifications(
    pool: &DbPool,
    status: Option<NotificationStatus>,
) -> Result<Vec<Notification>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    Ok(notifications)
}

/// Dispatch pending notifications in the background.
///
/// Called after a transaction that queued mail has committed.
pub fn spawn_dispatch(state: &AppState) {
    let pool = state.pool.clone();
    let config = state.config.clone();

    tokio::spawn(async move {
        match dispatch_pending(&pool, &config).await {
            Ok(summary) if summary.failed > 0 => {
                tracing::warn!(
                    sent = summary.sent,
                    failed = summary.failed,
                    "some notifications could not be delivered"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Notification dispatch failed: {:?}", e),
        }
    });
}

/// Deliver every `QUEUED` notification, and `FAILED` ones that still have
/// attempts left.
///
/// # Process
///
/// 1. Claim a batch by moving it to `SENDING` in one statement
/// 2. POST each claimed row to the relay with no transaction open
/// 3. Record each outcome in its own statement
///
/// A dispatcher that dies mid-batch leaves rows in `SENDING`; they are
/// claimed again once older than [`STALE_CLAIM_SECS`]. Delivery is
/// therefore at least once, and the relay can deduplicate on `X-Message-Id`.
///
/// # Error Handling
///
/// - Individual delivery failures are recorded on the row and counted
/// - A failure to record an outcome is logged and the batch continues
/// - Without a configured relay nothing is attempted
pub async fn dispatch_pending(pool: &DbPool, config: &Config) -> Result<DispatchSummary, AppError> {
    let Some(ref relay_url) = config.mail_relay_url else {
        tracing::warn!("MAIL_RELAY_URL is not set; notifications stay queued");
        return Ok(DispatchSummary {
            skipped: true,
            ..DispatchSummary::default()
        });
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AppError::InvalidRequest(format!("HTTP client error: {}", e)))?;

    let claimed = claim_pending(pool).await?;

    let mut summary = DispatchSummary {
        attempted: claimed.len(),
        ..DispatchSummary::default()
    };

    for notification in claimed {
        let letter = match notification.letter_id {
            Some(letter_id) => {
                sqlx::query_as::<_, Letter>("SELECT * FROM letters WHERE id = $1")
                    .bind(letter_id)
                    .fetch_optional(pool)
                    .await?
            }
            None => None,
        };

        let outcome = send_notification(
            &client,
            relay_url,
            config.mail_relay_secret.as_deref(),
            &notification,
            letter.as_ref(),
        )
        .await;

        if outcome.delivered {
            summary.sent += 1;
        } else {
            summary.failed += 1;
        }

        if let Err(e) = record_attempt(pool, notification.id, outcome).await {
            tracing::error!(
                notification_id = %notification.id,
                "Failed to record delivery outcome: {:?}",
                e
            );
        }
    }

    tracing::info!(
        attempted = summary.attempted,
        sent = summary.sent,
        failed = summary.failed,
        "notification dispatch finished"
    );

    Ok(summary)
}

/// Seconds after which a `SENDING` claim is considered abandoned.
pub const STALE_CLAIM_SECS: i64 = 600;

/// Rows claimed per dispatch.
const BATCH_SIZE: i64 = 50;

/// Move up to [`BATCH_SIZE`] deliverable rows to `SENDING` and return them,
/// oldest first.
///
/// The statement commits on its own. SKIP LOCKED keeps concurrent
/// dispatchers off each other's rows while it runs.
async fn claim_pending(pool: &DbPool) -> Result<Vec<Notification>, AppError> {
    let mut claimed = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET status = 'SENDING', claimed_at = NOW()
        WHERE id IN (
            SELECT id FROM notifications
            WHERE status = 'QUEUED'
               OR (status = 'FAILED' AND attempts < $1)
               OR (status = 'SENDING' AND claimed_at < NOW() - make_interval(secs => $2))
            ORDER BY created_at
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(MAX_ATTEMPTS)
    .bind(STALE_CLAIM_SECS as f64)
    .bind(BATCH_SIZE)
    .fetch_all(pool)
    .await?;

    // RETURNING does not preserve the subquery order
    claimed.sort_by_key(|n| n.created_at);

    Ok(claimed)
}

/// Result of one POST to the relay.
#[derive(Debug)]
struct DeliveryOutcome {
    delivered: bool,
    response_status: Option<i32>,
    response_body: Option<String>,
}

/// Post one notification to the relay.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Signature: sha256=<hex>` (when a relay secret is configured)
/// - `X-Message-Id: <uuid>`
///
/// `delivered` is set when the relay answered 2xx.
async fn send_notification(
    client: &reqwest::Client,
    relay_url: &str,
    secret: Option<&str>,
    notification: &Notification,
    letter: Option<&Letter>,
) -> DeliveryOutcome {
    let message = RelayMessage::new(notification, letter);
    let body = match serde_json::to_string(&message) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(notification_id = %notification.id, "Failed to serialize message: {}", e);
            return DeliveryOutcome {
                delivered: false,
                response_status: None,
                response_body: Some(format!("Failed to serialize message: {}", e)),
            };
        }
    };

    let mut request = client
        .post(relay_url)
        .header("Content-Type", "application/json")
        .header("X-Message-Id", notification.id.to_string());

    if let Some(secret) = secret {
        request = request.header("X-Signature", generate_signature(secret, &body));
    }

    match request.body(body).send().await {
        Ok(resp) => {
            let status = resp.status();
            DeliveryOutcome {
                delivered: status.is_success(),
                response_status: Some(status.as_u16() as i32),
                response_body: resp.text().await.ok(),
            }
        }
        Err(e) => {
            let error_msg = format!("Request failed: {}", e);
            tracing::error!(notification_id = %notification.id, "{}", error_msg);
            DeliveryOutcome {
                delivered: false,
                response_status: None,
                response_body: Some(error_msg),
            }
        }
    }
}

/// Store the outcome of one attempt. Only rows still claimed are touched.
async fn record_attempt(
    pool: &DbPool,
    notification_id: Uuid,
    outcome: DeliveryOutcome,
) -> Result<(), AppError> {
    let status = if outcome.delivered {
        NotificationStatus::Sent
    } else {
        NotificationStatus::Failed
    };

    sqlx::query(
        r#"
        UPDATE notifications
        SET status = $1,
            attempts = attempts + 1,
            response_status = $2,
            response_body = $3,
            claimed_at = NULL,
            sent_at = CASE WHEN $1 = 'SENT' THEN NOW() ELSE sent_at END
        WHERE id = $4 AND status = 'SENDING'
        "#,
    )
    .bind(status.as_str())
    .bind(outcome.response_status)
    .bind(outcome.response_body)
    .bind(notification_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Generate HMAC-SHA256 signature for a relay request body.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
pub fn generate_signature(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let result = mac.finalize();
    format!("sha256={}", hex::encode(result.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use axum::{Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use sqlx::PgPool;
    use std::sync::{Arc, Mutex};

    #[test]
    fn signature_matches_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            generate_signature("Jefe", "what do ya want for nothing?"),
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_depends_on_secret() {
        let body = r#"{"to":"a@example.org"}"#;
        assert_ne!(
            generate_signature("one", body),
            generate_signature("two", body)
        );
    }

    #[tokio::test]
    async fn dispatch_without_relay_is_skipped() {
        let config = sample_config();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool");

        let summary = dispatch_pending(&pool, &config).await.expect("skips");
        assert!(summary.skipped);
        assert_eq!(summary.attempted, 0);
    }

    const RELAY_SECRET: &str = "relay-secret";

    /// What the relay saw for one POST.
    #[derive(Debug, Clone)]
    struct Received {
        message_id: Uuid,
        signature_ok: bool,
        /// Row status read with `FOR UPDATE NOWAIT` while the request is open
        row_status: Result<String, String>,
    }

    #[derive(Clone)]
    struct Relay {
        pool: PgPool,
        reply: StatusCode,
        received: Arc<Mutex<Vec<Received>>>,
    }

    async fn relay_handler(State(relay): State<Relay>, headers: HeaderMap, body: String) -> StatusCode {
        let message_id: Uuid = headers["x-message-id"].to_str().unwrap().parse().unwrap();
        let signature_ok = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|sig| sig == generate_signature(RELAY_SECRET, &body));

        // Fails if the dispatcher still holds a lock on the row
        let row_status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM notifications WHERE id = $1 FOR UPDATE NOWAIT",
        )
        .bind(message_id)
        .fetch_one(&relay.pool)
        .await
        .map_err(|e| e.to_string());

        relay.received.lock().unwrap().push(Received {
            message_id,
            signature_ok,
            row_status,
        });
        relay.reply
    }

    async fn start_relay(pool: &PgPool, reply: StatusCode) -> (Config, Arc<Mutex<Vec<Received>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route("/send", post(relay_handler)).with_state(Relay {
            pool: pool.clone(),
            reply,
            received: received.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = Config {
            mail_relay_url: Some(format!("http://{addr}/send")),
            mail_relay_secret: Some(RELAY_SECRET.to_string()),
            ..sample_config()
        };
        (config, received)
    }

    async fn queue(pool: &PgPool, recipient: &str) -> Notification {
        let mut conn = pool.acquire().await.unwrap();
        queue_notification(
            &mut conn,
            NewNotification::new(None, recipient, "Application received", "We have your application.", None),
        )
        .await
        .unwrap()
    }

    async fn reload(pool: &PgPool, id: Uuid) -> Notification {
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rows_are_claimed_and_unlocked_while_posting(pool: PgPool) {
        let (config, received) = start_relay(&pool, StatusCode::ACCEPTED).await;
        let first = queue(&pool, "first@example.org").await;
        let second = queue(&pool, "second@example.org").await;

        let summary = dispatch_pending(&pool, &config).await.unwrap();
        assert_eq!((summary.attempted, summary.sent, summary.failed), (2, 2, 0));

        let seen = received.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message_id, first.id);
        assert_eq!(seen[1].message_id, second.id);
        for post in &seen {
            assert!(post.signature_ok);
            assert_eq!(post.row_status.as_deref(), Ok("SENDING"));
        }

        for id in [first.id, second.id] {
            let row = reload(&pool, id).await;
            assert_eq!(row.status, NotificationStatus::Sent);
            assert_eq!(row.attempts, 1);
            assert_eq!(row.response_status, Some(202));
            assert!(row.sent_at.is_some());
            assert!(row.claimed_at.is_none());
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sent_rows_are_not_sent_again(pool: PgPool) {
        let (config, received) = start_relay(&pool, StatusCode::OK).await;
        queue(&pool, "once@example.org").await;

        dispatch_pending(&pool, &config).await.unwrap();
        let again = dispatch_pending(&pool, &config).await.unwrap();

        assert_eq!(again.attempted, 0);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn relay_errors_mark_rows_failed_for_retry(pool: PgPool) {
        let (config, received) = start_relay(&pool, StatusCode::INTERNAL_SERVER_ERROR).await;
        let queued = queue(&pool, "retry@example.org").await;

        let summary = dispatch_pending(&pool, &config).await.unwrap();
        assert_eq!((summary.sent, summary.failed), (0, 1));

        let row = reload(&pool, queued.id).await;
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.response_status, Some(500));

        // Failed rows are retried until MAX_ATTEMPTS
        let retry = dispatch_pending(&pool, &config).await.unwrap();
        assert_eq!(retry.attempted, 1);
        assert_eq!(reload(&pool, queued.id).await.attempts, 2);

        sqlx::query("UPDATE notifications SET attempts = $1 WHERE id = $2")
            .bind(MAX_ATTEMPTS)
            .bind(queued.id)
            .execute(&pool)
            .await
            .unwrap();
        let exhausted = dispatch_pending(&pool, &config).await.unwrap();
        assert_eq!(exhausted.attempted, 0);
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn abandoned_claims_are_picked_up_again(pool: PgPool) {
        let (config, received) = start_relay(&pool, StatusCode::OK).await;
        let abandoned = queue(&pool, "abandoned@example.org").await;
        let in_flight = queue(&pool, "in-flight@example.org").await;

        sqlx::query(
            "UPDATE notifications SET status = 'SENDING', claimed_at = NOW() - make_interval(secs => $1) WHERE id = $2",
        )
        .bind((STALE_CLAIM_SECS + 60) as f64)
        .bind(abandoned.id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("UPDATE notifications SET status = 'SENDING', claimed_at = NOW() WHERE id = $1")
            .bind(in_flight.id)
            .execute(&pool)
            .await
            .unwrap();

        let summary = dispatch_pending(&pool, &config).await.unwrap();
        assert_eq!(summary.attempted, 1);

        let seen = received.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message_id, abandoned.id);
        assert_eq!(reload(&pool, abandoned.id).await.status, NotificationStatus::Sent);
        assert_eq!(reload(&pool, in_flight.id).await.status, NotificationStatus::Sending);
    }
}
