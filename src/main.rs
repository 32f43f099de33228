//! ERC review server - main entry point.
//!
//! REST API for an Ethics Review Committee office: applicants submit
//! research applications, the office checks documents and routes them to a
//! committee, committees decide at meetings and administrators ratify those
//! decisions, which issues letters and notifies applicants.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: bearer keys with SHA-256 hashing, one user per key
//! - **Workflow**: a single transition table in `workflow::status`
//! - **Mail**: outbox table delivered to an HMAC-signed HTTP mail relay
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Install the bootstrap administrator key, if configured
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

#[macro_use]
mod macros;

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod workflow;

#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, "info" by default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    if let Some(ref key) = config.admin_api_key {
        services::user_service::bootstrap_admin(&pool, key, &config.admin_email).await?;
    }

    if config.mail_relay_url.is_none() {
        tracing::warn!("MAIL_RELAY_URL is not set; applicant notifications will stay queued");
    }

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = routes::router(db::AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
