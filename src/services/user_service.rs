//! User accounts and bearer keys.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, conflict_on_unique};
use crate::middleware::auth::{generate_api_key, hash_api_key};
use crate::models::user::{
    ApiKey, Applicant, CreateUserRequest, Role, User, UserResponse, Validity,
};

/// Create a user and issue their first bearer key.
///
/// # Process
///
/// 1. Insert the user
/// 2. Insert the applicant profile for `APPLICANT` users
/// 3. Store the SHA-256 hash of a freshly generated key
/// 4. Commit
///
/// The plain key is returned once and never stored.
pub async fn create_user(pool: &DbPool, request: CreateUserRequest) -> Result<UserResponse, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (full_name, email, role)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(request.full_name.trim())
    .bind(request.email.trim().to_lowercase())
    .bind(request.role.as_str())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "a user with this email already exists"))?;

    let applicant = match request.applicant {
        Some(profile) => Some(
            sqlx::query_as::<_, Applicant>(
                r#"
                INSERT INTO applicants (user_id, category, evidence_url)
                VALUES ($1, $2, $3)
                RETURNING *
                "#,
            )
            .bind(user.id)
            .bind(profile.category.as_str())
            .bind(profile.evidence_url)
            .fetch_one(&mut *tx)
            .await?,
        ),
        None => None,
    };

    let api_key = generate_api_key();
    insert_api_key(&mut tx, user.id, &api_key).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user created");

    Ok(UserResponse::from(user)
        .with_applicant(applicant)
        .with_api_key(api_key))
}

pub async fn get_user(pool: &DbPool, user_id: Uuid) -> Result<UserResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let applicant = sqlx::query_as::<_, Applicant>("SELECT * FROM applicants WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(UserResponse::from(user).with_applicant(applicant))
}

pub async fn list_users(pool: &DbPool, role: Option<Role>) -> Result<Vec<UserResponse>, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE ($1::TEXT IS NULL OR role = $1)
        ORDER BY created_at DESC
        "#,
    )
    .bind(role.map(|r| r.as_str()))
    .fetch_all(pool)
    .await?;

    Ok(users.into_iter().map(UserResponse::from).collect())
}

/// Block or unblock a user. Admins cannot block themselves.
pub async fn set_validity(
    pool: &DbPool,
    actor_id: Uuid,
    user_id: Uuid,
    validity: Validity,
) -> Result<UserResponse, AppError> {
    if actor_id == user_id && validity == Validity::Blocked {
        return Err(AppError::RuleViolation(
            "administrators cannot block themselves".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET validity = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(validity.as_str())
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    tracing::info!(user_id = %user.id, validity = %user.validity, "user validity changed");

    Ok(UserResponse::from(user))
}

/// Make sure an admin owning `api_key` exists.
///
/// Runs at startup when `ADMIN_API_KEY` is configured. A key that already
/// resolves to a user is left untouched.
pub async fn bootstrap_admin(pool: &DbPool, api_key: &str, email: &str) -> Result<(), AppError> {
    let key_hash = hash_api_key(api_key);

    let existing = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
        .bind(&key_hash)
        .fetch_optional(pool)
        .await?;

    if let Some(key) = existing {
        if !key.is_active {
            tracing::warn!(
                api_key_id = %key.id,
                user_id = %key.user_id,
                "ADMIN_API_KEY belongs to an inactive key"
            );
        }
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (full_name, email, role)
        VALUES ('Administrator', $1, 'ADMIN')
        ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(email)
    .fetch_one(&mut *tx)
    .await?;

    if user.role != Role::Admin {
        return Err(AppError::Conflict(format!(
            "{email} already exists with role {}",
            user.role
        )));
    }

    insert_api_key(&mut tx, user.id, api_key).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "bootstrap administrator key installed");

    Ok(())
}

async fn insert_api_key(conn: &mut PgConnection, user_id: Uuid, api_key: &str) -> Result<(), AppError> {
    sqlx::query("INSERT INTO api_keys (user_id, key_hash) VALUES ($1, $2)")
        .bind(user_id)
        .bind(hash_api_key(api_key))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    #[tokio::test]
    async fn admins_cannot_block_themselves() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&sample_config().database_url)
            .expect("lazy pool");
        let admin_id = Uuid::new_v4();

        let result = set_validity(&pool, admin_id, admin_id, Validity::Blocked).await;
        assert!(matches!(result, Err(AppError::RuleViolation(_))));
    }

    #[tokio::test]
    async fn invalid_requests_fail_before_touching_the_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&sample_config().database_url)
            .expect("lazy pool");
        let request = CreateUserRequest {
            full_name: "Kamala Fernando".to_string(),
            email: "not-an-email".to_string(),
            role: Role::Staff,
            applicant: None,
        };

        let result = create_user(&pool, request).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn bootstrap_admin_installs_the_key_once(pool: sqlx::PgPool) {
        bootstrap_admin(&pool, "erc_bootstrap_key", "admin@erc.example.org")
            .await
            .unwrap();
        bootstrap_admin(&pool, "erc_bootstrap_key", "admin@erc.example.org")
            .await
            .unwrap();

        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(hash_api_key("erc_bootstrap_key"))
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].is_active);

        let owner = get_user(&pool, keys[0].user_id).await.unwrap();
        assert_eq!(owner.role, Role::Admin);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn bootstrap_admin_refuses_a_non_admin_email(pool: sqlx::PgPool) {
        let staff = crate::test_support::user(&pool, Role::Staff).await;

        let result = bootstrap_admin(&pool, "erc_bootstrap_key", &staff.email).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(keys, 0);
    }
}
