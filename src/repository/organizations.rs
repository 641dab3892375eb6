use sqlx::SqliteExecutor;

use crate::errors::LedgerResult;
use crate::models::{Organization, VerificationStatus};

pub async fn find_organization<'e, E>(executor: E, org_id: i64) -> LedgerResult<Option<Organization>>
where
    E: SqliteExecutor<'e>,
{
    let org = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = ?1")
        .bind(org_id)
        .fetch_optional(executor)
        .await?;
    Ok(org)
}

pub async fn find_organization_by_account<'e, E>(
    executor: E,
    account_id: i64,
) -> LedgerResult<Option<Organization>>
where
    E: SqliteExecutor<'e>,
{
    let org = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE account_id = ?1")
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
    Ok(org)
}

pub async fn lock_organization<'e, E>(executor: E, org_id: i64) -> LedgerResult<Option<Organization>>
where
    E: SqliteExecutor<'e>,
{
    let org = sqlx::query_as::<_, Organization>(
        "UPDATE organizations SET id = id WHERE id = ?1 RETURNING *",
    )
    .bind(org_id)
    .fetch_optional(executor)
    .await?;
    Ok(org)
}

pub async fn set_organization_audit_status<'e, E>(
    executor: E,
    org_id: i64,
    status: VerificationStatus,
) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE organizations SET audit_status = ?2 WHERE id = ?1")
        .bind(org_id)
        .bind(status)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
