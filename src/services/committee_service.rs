//! Committee management: committees and their members.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, conflict_on_unique};
use crate::models::committee::{
    AddMemberRequest, Committee, CommitteeMember, CreateCommitteeRequest, MemberRole,
};
use crate::models::user::{Role, User, Validity};

pub async fn create_committee(
    pool: &DbPool,
    request: CreateCommitteeRequest,
) -> Result<Committee, AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("name is required".to_string()));
    }

    let committee = sqlx::query_as::<_, Committee>(
        "INSERT INTO committees (name, committee_type) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(request.committee_type.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| conflict_on_unique(e, "a committee with this name already exists"))?;

    tracing::info!(committee_id = %committee.id, committee_type = %committee.committee_type, "committee created");

    Ok(committee)
}

pub async fn list_committees(pool: &DbPool) -> Result<Vec<Committee>, AppError> {
    let committees = sqlx::query_as::<_, Committee>("SELECT * FROM committees ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(committees)
}

pub async fn get_committee(pool: &DbPool, committee_id: Uuid) -> Result<Committee, AppError> {
    sqlx::query_as::<_, Committee>("SELECT * FROM committees WHERE id = $1")
        .bind(committee_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Committee"))
}

/// Partial unique index allowing one `CHAIR` row per committee.
const SINGLE_CHAIR_INDEX: &str = "committee_members_one_chair";

/// Whether a user with `role` may sit on a committee as `member_role`.
///
/// Applicants never sit on committees; committee staff seats are held by
/// office staff or admins.
pub fn can_hold_seat(role: Role, member_role: MemberRole) -> bool {
    match member_role {
        MemberRole::Chair | MemberRole::Member => {
            matches!(role, Role::CommitteeMember | Role::Admin)
        }
        MemberRole::Staff => matches!(role, Role::Staff | Role::Admin),
    }
}

/// Add a user to a committee.
///
/// # Validation
///
/// - Committee and user must exist; the user must be active
/// - The user's role must fit the seat ([`can_hold_seat`])
/// - A committee has at most one chair (also enforced by the
///   `committee_members_one_chair` index, which settles concurrent requests)
/// - A user sits on a committee at most once
pub async fn add_member(
    pool: &DbPool,
    committee_id: Uuid,
    request: AddMemberRequest,
) -> Result<CommitteeMember, AppError> {
    let committee = get_committee(pool, committee_id).await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(request.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if user.validity == Validity::Blocked {
        return Err(AppError::RuleViolation(
            "blocked users cannot join committees".to_string(),
        ));
    }
    if !can_hold_seat(user.role, request.role) {
        return Err(AppError::RuleViolation(format!(
            "a {} user cannot hold a {} seat",
            user.role, request.role
        )));
    }

    if request.role == MemberRole::Chair {
        let has_chair: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM committee_members WHERE committee_id = $1 AND role = 'CHAIR')",
        )
        .bind(committee.id)
        .fetch_one(pool)
        .await?;
        if has_chair {
            return Err(AppError::Conflict(
                "this committee already has a chair".to_string(),
            ));
        }
    }

    let member = sqlx::query_as::<_, CommitteeMember>(
        r#"
        INSERT INTO committee_members (committee_id, user_id, role)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(committee.id)
    .bind(user.id)
    .bind(request.role.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.constraint() == Some(SINGLE_CHAIR_INDEX) => {
            AppError::Conflict("this committee already has a chair".to_string())
        }
        other => conflict_on_unique(other, "the user is already a member of this committee"),
    })?;

    tracing::info!(committee_id = %committee.id, user_id = %user.id, role = %member.role, "committee member added");

    Ok(member)
}

pub async fn list_members(
    pool: &DbPool,
    committee_id: Uuid,
) -> Result<Vec<CommitteeMember>, AppError> {
    get_committee(pool, committee_id).await?;

    let members = sqlx::query_as::<_, CommitteeMember>(
        "SELECT * FROM committee_members WHERE committee_id = $1 ORDER BY created_at",
    )
    .bind(committee_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

/// Seat held by `user_id` on `committee_id`, if any.
///
/// Runs on the caller's connection so that checks made inside a transaction
/// see the same snapshot as the rest of it.
pub async fn member_role(
    conn: &mut PgConnection,
    committee_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MemberRole>, AppError> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM committee_members WHERE committee_id = $1 AND user_id = $2",
    )
    .bind(committee_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    role.map(|r| {
        r.parse::<MemberRole>()
            .map_err(|e| AppError::Database(sqlx::Error::Decode(Box::new(e))))
    })
    .transpose()
}
