use sqlx::SqliteExecutor;

use crate::errors::LedgerResult;
use crate::models::Activity;

pub async fn find_activity<'e, E>(executor: E, activity_id: i64) -> LedgerResult<Option<Activity>>
where
    E: SqliteExecutor<'e>,
{
    let activity = sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = ?1")
        .bind(activity_id)
        .fetch_optional(executor)
        .await?;
    Ok(activity)
}

pub async fn lock_activity<'e, E>(executor: E, activity_id: i64) -> LedgerResult<Option<Activity>>
where
    E: SqliteExecutor<'e>,
{
    let activity = sqlx::query_as::<_, Activity>(
        "UPDATE activities SET id = id WHERE id = ?1 RETURNING *",
    )
    .bind(activity_id)
    .fetch_optional(executor)
    .await?;
    Ok(activity)
}

/// Take one seat. Returns `false` when the activity is full or missing.
pub async fn increment_people<'e, E>(executor: E, activity_id: i64) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE activities
        SET current_people = current_people + 1
        WHERE id = ?1 AND (current_people < max_people OR max_people = 0)
        "#,
    )
    .bind(activity_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Release one seat. Returns `false` when the counter is already zero or the
/// activity is missing.
pub async fn decrement_people<'e, E>(executor: E, activity_id: i64) -> LedgerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE activities
        SET current_people = current_people - 1
        WHERE id = ?1 AND current_people > 0
        "#,
    )
    .bind(activity_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
