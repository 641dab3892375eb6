use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

use crate::errors::LedgerResult;
use crate::models::{MemberRole, MemberStatus, OrgMember};

#[derive(Debug, Clone)]
pub struct NewMembership {
    pub org_id: i64,
    pub volunteer_id: i64,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub applied_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Fields to overwrite on an existing membership; `None` keeps the column.
#[derive(Debug, Clone, Default)]
pub struct MembershipPatch {
    pub org_id: Option<i64>,
    pub volunteer_id: Option<i64>,
    pub role: Option<MemberRole>,
    pub status: Option<MemberStatus>,
    pub applied_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl MembershipPatch {
    pub fn is_empty(&self) -> bool {
        self.org_id.is_none()
            && self.volunteer_id.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.applied_at.is_none()
            && self.joined_at.is_none()
    }
}

pub async fn find_membership<'e, E>(executor: E, member_id: i64) -> LedgerResult<Option<OrgMember>>
where
    E: SqliteExecutor<'e>,
{
    let member = sqlx::query_as::<_, OrgMember>("SELECT * FROM org_members WHERE id = ?1")
        .bind(member_id)
        .fetch_optional(executor)
        .await?;
    Ok(member)
}

pub async fn find_membership_by_pair<'e, E>(
    executor: E,
    org_id: i64,
    volunteer_id: i64,
) -> LedgerResult<Option<OrgMember>>
where
    E: SqliteExecutor<'e>,
{
    let member = sqlx::query_as::<_, OrgMember>(
        "SELECT * FROM org_members WHERE org_id = ?1 AND volunteer_id = ?2",
    )
    .bind(org_id)
    .bind(volunteer_id)
    .fetch_optional(executor)
    .await?;
    Ok(member)
}

pub async fn insert_membership<'e, E>(executor: E, member: &NewMembership) -> LedgerResult<OrgMember>
where
    E: SqliteExecutor<'e>,
{
    let created = sqlx::query_as::<_, OrgMember>(
        r#"
        INSERT INTO org_members (org_id, volunteer_id, role, status, applied_at, joined_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING *
        "#,
    )
    .bind(member.org_id)
    .bind(member.volunteer_id)
    .bind(member.role)
    .bind(member.status)
    .bind(member.applied_at)
    .bind(member.joined_at)
    .fetch_one(executor)
    .await?;
    Ok(created)
}

pub async fn update_membership<'e, E>(
    executor: E,
    member_id: i64,
    patch: &MembershipPatch,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE org_members SET
            org_id       = COALESCE(?2, org_id),
            volunteer_id = COALESCE(?3, volunteer_id),
            role         = COALESCE(?4, role),
            status       = COALESCE(?5, status),
            applied_at   = COALESCE(?6, applied_at),
            joined_at    = COALESCE(?7, joined_at)
        WHERE id = ?1
        "#,
    )
    .bind(member_id)
    .bind(patch.org_id)
    .bind(patch.volunteer_id)
    .bind(patch.role)
    .bind(patch.status)
    .bind(patch.applied_at)
    .bind(patch.joined_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_membership_status<'e, E>(
    executor: E,
    member_id: i64,
    status: MemberStatus,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE org_members SET status = ?2 WHERE id = ?1")
        .bind(member_id)
        .bind(status)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
