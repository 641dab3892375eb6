use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

use crate::errors::LedgerResult;
use crate::models::{ActivitySignup, SignupStatus, WorkHourStatus};

/// New settlement state written together with a ledger entry.
///
/// `check_in_time` / `check_out_time` mark the corresponding leg done when
/// present and leave it untouched otherwise.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub work_hour_status: WorkHourStatus,
    pub work_hour_version: i64,
    pub last_work_hour_log_id: i64,
    pub granted_hours: f64,
    pub granted_at: Option<DateTime<Utc>>,
}

pub async fn find_signup<'e, E>(executor: E, signup_id: i64) -> LedgerResult<Option<ActivitySignup>>
where
    E: SqliteExecutor<'e>,
{
    let signup = sqlx::query_as::<_, ActivitySignup>("SELECT * FROM activity_signups WHERE id = ?1")
        .bind(signup_id)
        .fetch_optional(executor)
        .await?;
    Ok(signup)
}

pub async fn find_signup_by_pair<'e, E>(
    executor: E,
    activity_id: i64,
    volunteer_id: i64,
) -> LedgerResult<Option<ActivitySignup>>
where
    E: SqliteExecutor<'e>,
{
    let signup = sqlx::query_as::<_, ActivitySignup>(
        "SELECT * FROM activity_signups WHERE activity_id = ?1 AND volunteer_id = ?2",
    )
    .bind(activity_id)
    .bind(volunteer_id)
    .fetch_optional(executor)
    .await?;
    Ok(signup)
}

pub async fn lock_signup<'e, E>(executor: E, signup_id: i64) -> LedgerResult<Option<ActivitySignup>>
where
    E: SqliteExecutor<'e>,
{
    let signup = sqlx::query_as::<_, ActivitySignup>(
        "UPDATE activity_signups SET id = id WHERE id = ?1 RETURNING *",
    )
    .bind(signup_id)
    .fetch_optional(executor)
    .await?;
    Ok(signup)
}

pub async fn lock_signup_by_pair<'e, E>(
    executor: E,
    activity_id: i64,
    volunteer_id: i64,
) -> LedgerResult<Option<ActivitySignup>>
where
    E: SqliteExecutor<'e>,
{
    let signup = sqlx::query_as::<_, ActivitySignup>(
        r#"
        UPDATE activity_signups SET id = id
        WHERE activity_id = ?1 AND volunteer_id = ?2
        RETURNING *
        "#,
    )
    .bind(activity_id)
    .bind(volunteer_id)
    .fetch_optional(executor)
    .await?;
    Ok(signup)
}

pub async fn insert_signup<'e, E>(
    executor: E,
    activity_id: i64,
    volunteer_id: i64,
    status: SignupStatus,
    signup_time: DateTime<Utc>,
) -> LedgerResult<ActivitySignup>
where
    E: SqliteExecutor<'e>,
{
    let signup = sqlx::query_as::<_, ActivitySignup>(
        r#"
        INSERT INTO activity_signups (activity_id, volunteer_id, status, signup_time)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING *
        "#,
    )
    .bind(activity_id)
    .bind(volunteer_id)
    .bind(status)
    .bind(signup_time)
    .fetch_one(executor)
    .await?;
    Ok(signup)
}

pub async fn set_signup_status<'e, E>(
    executor: E,
    signup_id: i64,
    status: SignupStatus,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE activity_signups SET status = ?2 WHERE id = ?1")
        .bind(signup_id)
        .bind(status)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Re-activate a canceled or rejected signup. Attendance from the earlier
/// attempt is cleared unless work hours were already settled on the row.
pub async fn reopen_signup<'e, E>(executor: E, signup_id: i64) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE activity_signups SET
            status           = 'success',
            check_in_status  = CASE WHEN work_hour_status = 'pending' THEN 'pending' ELSE check_in_status END,
            check_in_time    = CASE WHEN work_hour_status = 'pending' THEN NULL ELSE check_in_time END,
            check_out_status = CASE WHEN work_hour_status = 'pending' THEN 'pending' ELSE check_out_status END,
            check_out_time   = CASE WHEN work_hour_status = 'pending' THEN NULL ELSE check_out_time END
        WHERE id = ?1
        "#,
    )
    .bind(signup_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Flip a signup to canceled only if it is still pending or successful.
pub async fn cancel_signup<'e, E>(executor: E, signup_id: i64) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE activity_signups SET status = 'canceled'
        WHERE id = ?1 AND status IN ('pending', 'success')
        "#,
    )
    .bind(signup_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_checked_in<'e, E>(
    executor: E,
    signup_id: i64,
    at: DateTime<Utc>,
) -> LedgerResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE activity_signups SET check_in_status = 'done', check_in_time = ?2 WHERE id = ?1",
    )
    .bind(signup_id)
    .bind(at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Compare-and-set on the work-hour version. Returns `false` when another
/// writer advanced the version since `expected_version` was read.
pub async fn settle<'e, E>(
    executor: E,
    signup_id: i64,
    expected_version: i64,
    settlement: &Settlement,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE activity_signups SET
            check_in_status       = CASE WHEN ?3 IS NULL THEN check_in_status ELSE 'done' END,
            check_in_time         = COALESCE(?3, check_in_time),
            check_out_status      = CASE WHEN ?4 IS NULL THEN check_out_status ELSE 'done' END,
            check_out_time        = COALESCE(?4, check_out_time),
            work_hour_status      = ?5,
            work_hour_version     = ?6,
            last_work_hour_log_id = ?7,
            granted_hours         = ?8,
            granted_at            = ?9
        WHERE id = ?1 AND work_hour_version = ?2
        "#,
    )
    .bind(signup_id)
    .bind(expected_version)
    .bind(settlement.check_in_time)
    .bind(settlement.check_out_time)
    .bind(settlement.work_hour_status)
    .bind(settlement.work_hour_version)
    .bind(settlement.last_work_hour_log_id)
    .bind(settlement.granted_hours)
    .bind(settlement.granted_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
