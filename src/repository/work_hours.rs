use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::errors::LedgerResult;
use crate::models::{WorkHourLog, WorkHourOperation};

/// Ledger entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewWorkHourLog {
    pub volunteer_id: i64,
    pub activity_id: i64,
    pub signup_id: i64,
    pub operation_type: WorkHourOperation,
    pub hours_delta: f64,
    pub service_count_delta: i64,
    pub before_total_hours: f64,
    pub after_total_hours: f64,
    pub before_service_count: i64,
    pub after_service_count: i64,
    pub work_hour_version: i64,
    pub granted_hours: f64,
    pub idempotency_key: String,
    pub ref_log_id: Option<i64>,
    pub reason: String,
    pub operator_id: i64,
}

/// Which slice of the ledger to read.
#[derive(Debug, Clone, Default)]
pub struct LogScope {
    pub volunteer_id: Option<i64>,
    /// All activities owned by this organization
    pub org_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub signup_id: Option<i64>,
    pub operation_type: Option<WorkHourOperation>,
}

/// Append an entry. Unique violations (idempotency key, signup version) are
/// returned as database errors for the caller to classify.
pub async fn insert_log<'e, E>(
    executor: E,
    entry: &NewWorkHourLog,
    created_at: DateTime<Utc>,
) -> LedgerResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO work_hour_logs (
            volunteer_id, activity_id, signup_id, operation_type,
            hours_delta, service_count_delta,
            before_total_hours, after_total_hours,
            before_service_count, after_service_count,
            work_hour_version, granted_hours, idempotency_key,
            ref_log_id, reason, operator_id, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        RETURNING id
        "#,
    )
    .bind(entry.volunteer_id)
    .bind(entry.activity_id)
    .bind(entry.signup_id)
    .bind(entry.operation_type)
    .bind(entry.hours_delta)
    .bind(entry.service_count_delta)
    .bind(entry.before_total_hours)
    .bind(entry.after_total_hours)
    .bind(entry.before_service_count)
    .bind(entry.after_service_count)
    .bind(entry.work_hour_version)
    .bind(entry.granted_hours)
    .bind(&entry.idempotency_key)
    .bind(entry.ref_log_id)
    .bind(&entry.reason)
    .bind(entry.operator_id)
    .bind(created_at)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

pub async fn find_log<'e, E>(executor: E, log_id: i64) -> LedgerResult<Option<WorkHourLog>>
where
    E: SqliteExecutor<'e>,
{
    let log = sqlx::query_as::<_, WorkHourLog>("SELECT * FROM work_hour_logs WHERE id = ?1")
        .bind(log_id)
        .fetch_optional(executor)
        .await?;
    Ok(log)
}

pub async fn find_log_by_key<'e, E>(executor: E, key: &str) -> LedgerResult<Option<WorkHourLog>>
where
    E: SqliteExecutor<'e>,
{
    let log = sqlx::query_as::<_, WorkHourLog>(
        "SELECT * FROM work_hour_logs WHERE idempotency_key = ?1",
    )
    .bind(key)
    .fetch_optional(executor)
    .await?;
    Ok(log)
}

pub async fn logs_for_signup<'e, E>(executor: E, signup_id: i64) -> LedgerResult<Vec<WorkHourLog>>
where
    E: SqliteExecutor<'e>,
{
    let logs = sqlx::query_as::<_, WorkHourLog>(
        "SELECT * FROM work_hour_logs WHERE signup_id = ?1 ORDER BY work_hour_version ASC",
    )
    .bind(signup_id)
    .fetch_all(executor)
    .await?;
    Ok(logs)
}

fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: &LogScope) {
    builder.push(" WHERE 1 = 1");
    if let Some(volunteer_id) = scope.volunteer_id {
        builder.push(" AND volunteer_id = ").push_bind(volunteer_id);
    }
    if let Some(org_id) = scope.org_id {
        builder
            .push(" AND activity_id IN (SELECT id FROM activities WHERE org_id = ")
            .push_bind(org_id)
            .push(")");
    }
    if let Some(activity_id) = scope.activity_id {
        builder.push(" AND activity_id = ").push_bind(activity_id);
    }
    if let Some(signup_id) = scope.signup_id {
        builder.push(" AND signup_id = ").push_bind(signup_id);
    }
    if let Some(operation) = scope.operation_type {
        builder.push(" AND operation_type = ").push_bind(operation);
    }
}

/// Newest first, with the total count of the unpaged scope.
pub async fn list_logs(
    pool: &SqlitePool,
    scope: &LogScope,
    limit: i64,
    offset: i64,
) -> LedgerResult<(Vec<WorkHourLog>, i64)> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM work_hour_logs");
    push_scope(&mut count, scope);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    if total == 0 {
        return Ok((Vec::new(), 0));
    }

    let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM work_hour_logs");
    push_scope(&mut select, scope);
    select
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let logs = select.build_query_as::<WorkHourLog>().fetch_all(pool).await?;

    Ok((logs, total))
}
