//! Bearer key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the bearer key from the Authorization header
//! 2. Hash it and resolve the owning user
//! 3. Reject inactive keys and blocked users with HTTP 401
//! 4. Inject the user's identity and role into the request

use crate::{
    db::DbPool,
    error::AppError,
    models::user::{Role, User, Validity},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    /// Fail with `Forbidden` unless the user holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} may not perform this operation",
                self.role
            )))
        }
    }

    pub fn is_office(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }
}

impl From<User> for AuthContext {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
        }
    }
}

/// SHA-256 hex digest stored in `api_keys.key_hash`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new bearer key (64 hex characters, 32 random bytes).
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Bearer key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up an active key with that hash and join its user
/// 4. Reject blocked users
/// 5. Inject `AuthContext` into request, call next handler
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    let api_key = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_api_key(api_key);

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM api_keys k
        JOIN users u ON u.id = k.user_id
        WHERE k.key_hash = $1 AND k.is_active = true
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    if user.validity == Validity::Blocked {
        tracing::warn!(user_id = %user.id, "blocked user attempted to authenticate");
        return Err(AppError::InvalidApiKey);
    }

    request.extensions_mut().insert(AuthContext::from(user));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn hashes_keys_with_sha256() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn generated_keys_are_unique_hex() {
        let first = generate_api_key();
        let second = generate_api_key();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn require_checks_role_membership() {
        let staff = context(Role::Staff);
        assert!(staff.require(&[Role::Staff, Role::Admin]).is_ok());
        assert!(matches!(
            staff.require(&[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
        assert!(staff.is_office());
        assert!(!context(Role::Applicant).is_office());
    }
}
