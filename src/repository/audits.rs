use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::errors::LedgerResult;
use crate::models::{AuditOperation, AuditRecord, AuditResult, AuditStatus, AuditTargetType};

#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub target_type: AuditTargetType,
    pub target_id: Option<i64>,
    pub operation_type: AuditOperation,
    pub creator_id: i64,
    pub old_content: String,
    pub new_content: String,
    pub subject: AuditSubject,
}

/// Identifiers extracted from a snapshot so pending proposals can be found
/// through an index instead of parsing every pending record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSubject {
    pub activity_id: Option<i64>,
    pub volunteer_id: Option<i64>,
    pub org_id: Option<i64>,
}

/// Final state written when a reviewer resolves a record.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: AuditStatus,
    pub result: AuditResult,
    pub auditor_id: i64,
    pub reject_reason: Option<String>,
    pub audit_time: DateTime<Utc>,
}

pub async fn insert_audit_record<'e, E>(
    executor: E,
    record: &NewAuditRecord,
    created_at: DateTime<Utc>,
) -> LedgerResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO audit_records (
            target_type, target_id, operation_type, creator_id,
            old_content, new_content, status, created_at,
            subject_activity_id, subject_volunteer_id, subject_org_id
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10)
        RETURNING id
        "#,
    )
    .bind(record.target_type.as_str())
    .bind(record.target_id)
    .bind(record.operation_type)
    .bind(record.creator_id)
    .bind(&record.old_content)
    .bind(&record.new_content)
    .bind(created_at)
    .bind(record.subject.activity_id)
    .bind(record.subject.volunteer_id)
    .bind(record.subject.org_id)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

pub async fn find_audit_record<'e, E>(executor: E, record_id: i64) -> LedgerResult<Option<AuditRecord>>
where
    E: SqliteExecutor<'e>,
{
    let record = sqlx::query_as::<_, AuditRecord>("SELECT * FROM audit_records WHERE id = ?1")
        .bind(record_id)
        .fetch_optional(executor)
        .await?;
    Ok(record)
}

/// Move a pending record to its final state. Returns `false` when the record
/// is no longer pending (or missing), which makes resolution exactly-once.
pub async fn resolve_pending<'e, E>(
    executor: E,
    record_id: i64,
    resolution: &Resolution,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE audit_records SET
            status        = ?2,
            audit_result  = ?3,
            auditor_id    = ?4,
            reject_reason = ?5,
            audit_time    = ?6
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(record_id)
    .bind(resolution.status)
    .bind(resolution.result)
    .bind(resolution.auditor_id)
    .bind(&resolution.reject_reason)
    .bind(resolution.audit_time)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Pending "create" proposals of one target type whose indexed subject
/// matches. Callers still confirm each candidate against its snapshot.
pub async fn pending_creates_for_subject<'e, E>(
    executor: E,
    target_type: AuditTargetType,
    subject: AuditSubject,
) -> LedgerResult<Vec<AuditRecord>>
where
    E: SqliteExecutor<'e>,
{
    let records = sqlx::query_as::<_, AuditRecord>(
        r#"
        SELECT * FROM audit_records
        WHERE target_type = ?1
          AND operation_type = 'create'
          AND status = 'pending'
          AND subject_activity_id IS ?2
          AND subject_volunteer_id IS ?3
          AND subject_org_id IS ?4
        ORDER BY id ASC
        "#,
    )
    .bind(target_type.as_str())
    .bind(subject.activity_id)
    .bind(subject.volunteer_id)
    .bind(subject.org_id)
    .fetch_all(executor)
    .await?;
    Ok(records)
}

pub async fn has_pending_for_target<'e, E>(
    executor: E,
    target_type: AuditTargetType,
    target_id: i64,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM audit_records
        WHERE target_type = ?1 AND target_id = ?2 AND status = 'pending'
        LIMIT 1
        "#,
    )
    .bind(target_type.as_str())
    .bind(target_id)
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

/// Filter for the membership-join review queue of one organization.
#[derive(Debug, Clone)]
pub struct JoinQueueFilter {
    pub org_id: i64,
    pub statuses: Vec<AuditStatus>,
    /// Substring of the applicant's real name
    pub keyword: Option<String>,
}

fn push_join_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a JoinQueueFilter) {
    builder
        .push(
            " FROM audit_records a LEFT JOIN volunteers v ON v.id = a.subject_volunteer_id \
             WHERE a.target_type = 'membership' AND a.operation_type = 'create' \
             AND a.subject_org_id = ",
        )
        .push_bind(filter.org_id);

    if !filter.statuses.is_empty() {
        builder.push(" AND a.status IN (");
        let mut separated = builder.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");
    }

    if let Some(keyword) = &filter.keyword {
        builder
            .push(" AND v.real_name LIKE '%' || ")
            .push_bind(keyword.as_str())
            .push(" || '%'");
    }
}

pub async fn list_membership_joins(
    pool: &SqlitePool,
    filter: &JoinQueueFilter,
    limit: i64,
    offset: i64,
) -> LedgerResult<(Vec<AuditRecord>, i64)> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    push_join_filter(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    if total == 0 {
        return Ok((Vec::new(), 0));
    }

    let mut select = QueryBuilder::<Sqlite>::new("SELECT a.*");
    push_join_filter(&mut select, filter);
    select
        .push(" ORDER BY a.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let records = select.build_query_as::<AuditRecord>().fetch_all(pool).await?;

    Ok((records, total))
}
