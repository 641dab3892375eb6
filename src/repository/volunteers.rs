use sqlx::SqliteExecutor;

use crate::errors::LedgerResult;
use crate::models::{VerificationStatus, Volunteer};

pub async fn find_volunteer<'e, E>(executor: E, volunteer_id: i64) -> LedgerResult<Option<Volunteer>>
where
    E: SqliteExecutor<'e>,
{
    let volunteer = sqlx::query_as::<_, Volunteer>("SELECT * FROM volunteers WHERE id = ?1")
        .bind(volunteer_id)
        .fetch_optional(executor)
        .await?;
    Ok(volunteer)
}

pub async fn find_volunteer_by_account<'e, E>(
    executor: E,
    account_id: i64,
) -> LedgerResult<Option<Volunteer>>
where
    E: SqliteExecutor<'e>,
{
    let volunteer = sqlx::query_as::<_, Volunteer>("SELECT * FROM volunteers WHERE account_id = ?1")
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
    Ok(volunteer)
}

pub async fn lock_volunteer<'e, E>(executor: E, volunteer_id: i64) -> LedgerResult<Option<Volunteer>>
where
    E: SqliteExecutor<'e>,
{
    let volunteer = sqlx::query_as::<_, Volunteer>(
        "UPDATE volunteers SET id = id WHERE id = ?1 RETURNING *",
    )
    .bind(volunteer_id)
    .fetch_optional(executor)
    .await?;
    Ok(volunteer)
}

/// Overwrite the aggregate. Only the ledger write path calls this, with the
/// after-values of the entry it just appended.
pub async fn update_aggregate<'e, E>(
    executor: E,
    volunteer_id: i64,
    total_hours: f64,
    service_count: i64,
) -> LedgerResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE volunteers SET total_hours = ?2, service_count = ?3 WHERE id = ?1")
        .bind(volunteer_id)
        .bind(total_hours)
        .bind(service_count)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_volunteer_audit_status<'e, E>(
    executor: E,
    volunteer_id: i64,
    status: VerificationStatus,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE volunteers SET audit_status = ?2 WHERE id = ?1")
        .bind(volunteer_id)
        .bind(status)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
