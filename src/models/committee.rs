//! Committee and committee member models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Committee in the review hierarchy.
    ///
    /// - `ERC`: the main Ethics Review Committee
    /// - `CTSC`: Clinical Trials sub-committee
    /// - `ARWC`: Animal Research sub-committee
    pub enum CommitteeType {
        Erc => "ERC",
        Ctsc => "CTSC",
        Arwc => "ARWC",
    }
}

text_enum! {
    /// Role of a member inside one committee.
    pub enum MemberRole {
        Chair => "CHAIR",
        Member => "MEMBER",
        Staff => "STAFF",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Committee {
    pub id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub committee_type: CommitteeType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CommitteeMember {
    pub id: Uuid,
    pub committee_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/committees`.
#[derive(Debug, Deserialize)]
pub struct CreateCommitteeRequest {
    pub name: String,
    pub committee_type: CommitteeType,
}

/// Request body for `POST /api/v1/committees/{id}/members`.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: MemberRole,
}

fn default_member_role() -> MemberRole {
    MemberRole::Member
}
