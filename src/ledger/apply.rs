use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use super::chain::verify_chain;
use super::hours::round_hours;
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{ActivitySignup, WorkHourLog, WorkHourOperation, WorkHourStatus};
use crate::repository::signups::{self, Settlement};
use crate::repository::work_hours::{self, NewWorkHourLog};
use crate::repository::volunteers;

/// One ledger mutation planned against a locked signup.
#[derive(Debug, Clone)]
pub(crate) struct EntryPlan {
    pub operation: WorkHourOperation,
    pub hours_delta: f64,
    pub service_count_delta: i64,
    pub idempotency_key: String,
    pub reason: String,
    pub operator_id: i64,
    /// Settlement written to the signup once the entry is appended
    pub work_hour_status: WorkHourStatus,
    pub granted_hours: f64,
    pub granted_at: Option<DateTime<Utc>>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) enum Appended {
    Applied { log_id: i64 },
    /// The idempotency key was taken by a concurrent attempt
    KeyTaken(WorkHourLog),
}

/// Append a ledger entry and apply it to the volunteer aggregate and the
/// signup settlement. Must run inside the transaction that locked `signup`.
pub(crate) async fn append_entry(
    conn: &mut SqliteConnection,
    signup: &ActivitySignup,
    plan: EntryPlan,
    now: DateTime<Utc>,
) -> LedgerResult<Appended> {
    let volunteer = volunteers::lock_volunteer(&mut *conn, signup.volunteer_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("volunteer"))?;

    let before_hours = volunteer.total_hours;
    let before_count = volunteer.service_count;
    let after_hours = round_hours(before_hours + plan.hours_delta);
    let after_count = before_count + plan.service_count_delta;
    if after_hours < 0.0 || after_count < 0 {
        warn!(
            volunteer_id = volunteer.id,
            signup_id = signup.id,
            before_hours,
            hours_delta = plan.hours_delta,
            before_count,
            "Refusing ledger entry that would make the aggregate negative"
        );
        return Err(LedgerError::conflict(format!(
            "volunteer {} aggregate would go negative",
            volunteer.id
        )));
    }

    let new_version = signup.work_hour_version + 1;
    let entry = NewWorkHourLog {
        volunteer_id: signup.volunteer_id,
        activity_id: signup.activity_id,
        signup_id: signup.id,
        operation_type: plan.operation,
        hours_delta: plan.hours_delta,
        service_count_delta: plan.service_count_delta,
        before_total_hours: before_hours,
        after_total_hours: after_hours,
        before_service_count: before_count,
        after_service_count: after_count,
        work_hour_version: new_version,
        granted_hours: plan.granted_hours,
        idempotency_key: plan.idempotency_key.clone(),
        ref_log_id: signup.last_work_hour_log_id,
        reason: plan.reason,
        operator_id: plan.operator_id,
    };

    let log_id = match work_hours::insert_log(&mut *conn, &entry, now).await {
        Ok(id) => id,
        Err(err) if err.is_unique_violation() => {
            if let Some(existing) = work_hours::find_log_by_key(&mut *conn, &plan.idempotency_key).await? {
                debug!(
                    key = %plan.idempotency_key,
                    log_id = existing.id,
                    "Idempotency key taken while inserting"
                );
                return Ok(Appended::KeyTaken(existing));
            }
            return Err(LedgerError::chain_broken(
                signup.id,
                format!("version {new_version} already recorded"),
            ));
        }
        Err(err) => return Err(err),
    };

    volunteers::update_aggregate(&mut *conn, volunteer.id, after_hours, after_count).await?;

    let settlement = Settlement {
        check_in_time: plan.check_in_time,
        check_out_time: plan.check_out_time,
        work_hour_status: plan.work_hour_status,
        work_hour_version: new_version,
        last_work_hour_log_id: log_id,
        granted_hours: plan.granted_hours,
        granted_at: plan.granted_at,
    };
    if !signups::settle(&mut *conn, signup.id, signup.work_hour_version, &settlement).await? {
        return Err(LedgerError::chain_broken(
            signup.id,
            format!("version {} advanced concurrently", signup.work_hour_version),
        ));
    }

    info!(
        signup_id = signup.id,
        volunteer_id = volunteer.id,
        log_id,
        operation = plan.operation.as_str(),
        hours_delta = plan.hours_delta,
        after_total_hours = after_hours,
        after_service_count = after_count,
        version = new_version,
        "Ledger entry applied"
    );
    Ok(Appended::Applied { log_id })
}

/// First settlement of an attendance: check-out or supplemented attendance.
#[derive(Debug, Clone)]
pub(crate) struct GrantEntry {
    pub hours: f64,
    pub idempotency_key: String,
    pub reason: String,
    pub operator_id: i64,
    /// Set when the check-in leg is written by the same settlement
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: DateTime<Utc>,
    pub granted_at: DateTime<Utc>,
}

/// Grant hours for a locked, checked-in signup that has not been settled yet.
pub(crate) async fn grant(
    conn: &mut SqliteConnection,
    signup: &ActivitySignup,
    entry: GrantEntry,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    verify_chain(&mut *conn, signup).await?;
    if signup.work_hour_status != WorkHourStatus::Pending {
        return Err(LedgerError::conflict(format!(
            "signup {} is already settled",
            signup.id
        )));
    }

    let hours = round_hours(entry.hours);
    let plan = EntryPlan {
        operation: WorkHourOperation::Grant,
        hours_delta: hours,
        service_count_delta: 1,
        idempotency_key: entry.idempotency_key,
        reason: entry.reason,
        operator_id: entry.operator_id,
        work_hour_status: WorkHourStatus::Granted,
        granted_hours: hours,
        granted_at: Some(entry.granted_at),
        check_in_time: entry.check_in_time,
        check_out_time: Some(entry.check_out_time),
    };

    match append_entry(conn, signup, plan, now).await? {
        Appended::Applied { log_id } => Ok(log_id),
        Appended::KeyTaken(existing) => Err(LedgerError::chain_broken(
            signup.id,
            format!(
                "grant key {} already recorded by log {}",
                existing.idempotency_key, existing.id
            ),
        )),
    }
}
