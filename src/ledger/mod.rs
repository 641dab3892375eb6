//! Work-hour ledger: append-only entries that grant, void and recompute a
//! signup's hours while keeping the volunteer aggregate in step.

mod apply;
pub mod chain;
pub mod hours;

pub(crate) use apply::{grant, GrantEntry};
pub use hours::{calc_granted_hours, round_hours};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn, Instrument};

use apply::{append_entry, Appended, EntryPlan};
use chain::verify_chain;
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{
    ActivityStatus, Actor, CheckStatus, IdentityType, Page, PageRequest, WorkHourLog,
    WorkHourOperation, WorkHourStatus,
};
use crate::repository::work_hours::{self, LogScope};
use crate::repository::{activities, signups};
use crate::service::{self, ServiceContext};
use crate::telemetry::{generate_correlation_id, ledger_span};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidRequest {
    pub signup_id: i64,
    pub reason: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculateRequest {
    pub signup_id: i64,
    pub reason: String,
    pub idempotency_key: String,
    /// Explicit target; `None` recomputes from attendance and the duration cap
    pub hours: Option<f64>,
}

/// Result of a void or recalculation, identical across replays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerOutcome {
    pub log_id: i64,
    pub granted_hours: f64,
    /// Served from an earlier entry with the same idempotency key
    pub replayed: bool,
}

impl LedgerOutcome {
    fn replay(log: &WorkHourLog) -> Self {
        Self {
            log_id: log.id,
            granted_hours: log.granted_hours,
            replayed: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    pub activity_id: Option<i64>,
    pub signup_id: Option<i64>,
    pub operation_type: Option<WorkHourOperation>,
    #[serde(default)]
    pub page: PageRequest,
}

/// Operator-facing ledger operations. Grants are issued by the signup flow.
#[derive(Clone)]
pub struct WorkHourLedger {
    ctx: ServiceContext,
}

/// Who may replay an entry: same signup, same operation, same operator.
fn check_replay(
    log: &WorkHourLog,
    signup_id: i64,
    operation: WorkHourOperation,
    operator_id: i64,
) -> LedgerResult<LedgerOutcome> {
    if log.signup_id != signup_id || log.operation_type != operation || log.operator_id != operator_id {
        return Err(LedgerError::IdempotencyConflict {
            key: log.idempotency_key.clone(),
        });
    }
    Ok(LedgerOutcome::replay(log))
}

impl WorkHourLedger {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reverse the hours granted to a signup.
    pub async fn void(&self, actor: &Actor, request: VoidRequest) -> LedgerResult<LedgerOutcome> {
        let span = ledger_span("void", Some(request.signup_id), &generate_correlation_id());
        self.void_inner(actor, request).instrument(span).await
    }

    async fn void_inner(&self, actor: &Actor, request: VoidRequest) -> LedgerResult<LedgerOutcome> {
        let reason = self.ctx.validate_reason(&request.reason)?;
        let key = self.ctx.validate_idempotency_key(&request.idempotency_key)?;
        actor.require_organization()?;
        let signup_id = request.signup_id;
        let actor = *actor;

        if let Some(existing) = work_hours::find_log_by_key(&self.ctx.pool, &key).await? {
            let outcome = check_replay(&existing, signup_id, WorkHourOperation::Void, actor.account_id)?;
            info!(signup_id, log_id = outcome.log_id, "Void replayed from idempotency key");
            return Ok(outcome);
        }

        let now = self.ctx.now();
        let result = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                let key = key.clone();
                let reason = reason.clone();
                Box::pin(async move { void_in_tx(conn, &actor, signup_id, key, reason, now).await })
            })
            .await;

        match &result {
            Ok(outcome) => info!(
                signup_id,
                log_id = outcome.log_id,
                replayed = outcome.replayed,
                "Work hours voided"
            ),
            Err(err) => warn!(signup_id, error = %err, "Void rejected"),
        }
        result
    }

    /// Recompute a settled signup's hours, or regrant a voided one.
    pub async fn recalculate(
        &self,
        actor: &Actor,
        request: RecalculateRequest,
    ) -> LedgerResult<LedgerOutcome> {
        let span = ledger_span("recalculate", Some(request.signup_id), &generate_correlation_id());
        self.recalculate_inner(actor, request).instrument(span).await
    }

    async fn recalculate_inner(
        &self,
        actor: &Actor,
        request: RecalculateRequest,
    ) -> LedgerResult<LedgerOutcome> {
        let reason = self.ctx.validate_reason(&request.reason)?;
        let key = self.ctx.validate_idempotency_key(&request.idempotency_key)?;
        if let Some(hours) = request.hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(LedgerError::validation(format!(
                    "target hours must be a non-negative number, got {hours}"
                )));
            }
        }
        actor.require_organization()?;
        let signup_id = request.signup_id;
        let target = request.hours;
        let actor = *actor;

        if let Some(existing) = work_hours::find_log_by_key(&self.ctx.pool, &key).await? {
            let outcome =
                check_replay(&existing, signup_id, WorkHourOperation::Regrant, actor.account_id)?;
            info!(signup_id, log_id = outcome.log_id, "Recalculation replayed from idempotency key");
            return Ok(outcome);
        }

        let now = self.ctx.now();
        let result = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                let key = key.clone();
                let reason = reason.clone();
                Box::pin(async move {
                    recalculate_in_tx(conn, &actor, signup_id, target, key, reason, now).await
                })
            })
            .await;

        match &result {
            Ok(outcome) => info!(
                signup_id,
                log_id = outcome.log_id,
                granted_hours = outcome.granted_hours,
                replayed = outcome.replayed,
                "Work hours recalculated"
            ),
            Err(err) => warn!(signup_id, error = %err, "Recalculation rejected"),
        }
        result
    }

    /// Ledger entries visible to the actor, newest first.
    pub async fn list_logs(&self, actor: &Actor, filter: LogFilter) -> LedgerResult<Page<WorkHourLog>> {
        let (page, page_size, offset) = filter.page.resolve(&self.ctx.limits);
        let mut conn = self.ctx.pool.acquire().await?;

        let mut scope = LogScope {
            signup_id: filter.signup_id,
            operation_type: filter.operation_type,
            activity_id: filter.activity_id,
            ..LogScope::default()
        };
        match actor.identity {
            IdentityType::Volunteer => {
                let volunteer = service::acting_volunteer(&mut conn, actor).await?;
                scope.volunteer_id = Some(volunteer.id);
            }
            IdentityType::Organization => {
                let org = service::acting_organization(&mut conn, actor).await?;
                match filter.activity_id {
                    Some(activity_id) => {
                        let activity = activities::find_activity(&mut *conn, activity_id)
                            .await?
                            .ok_or_else(|| LedgerError::not_found("activity"))?;
                        if activity.org_id != org.id {
                            return Err(LedgerError::PermissionDenied(format!(
                                "activity {activity_id} does not belong to organization {}",
                                org.id
                            )));
                        }
                    }
                    None => scope.org_id = Some(org.id),
                }
            }
        }
        drop(conn);

        let (items, total) =
            work_hours::list_logs(&self.ctx.pool, &scope, i64::from(page_size), offset).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }
}

async fn void_in_tx(
    conn: &mut SqliteConnection,
    actor: &Actor,
    signup_id: i64,
    key: String,
    reason: String,
    now: DateTime<Utc>,
) -> LedgerResult<LedgerOutcome> {
    let signup = signups::lock_signup(&mut *conn, signup_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("signup"))?;

    // A concurrent attempt with the same key may have committed while we waited.
    if let Some(existing) = work_hours::find_log_by_key(&mut *conn, &key).await? {
        return check_replay(&existing, signup_id, WorkHourOperation::Void, actor.account_id);
    }

    let (activity, _) = service::operable_activity(&mut *conn, actor, signup.activity_id).await?;
    if activity.status == ActivityStatus::Canceled {
        return Err(LedgerError::conflict(format!(
            "activity {} is canceled",
            activity.id
        )));
    }
    if signup.work_hour_status != WorkHourStatus::Granted || signup.last_work_hour_log_id.is_none() {
        return Err(LedgerError::conflict(format!(
            "signup {} has no granted hours to void",
            signup.id
        )));
    }
    verify_chain(&mut *conn, &signup).await?;

    let plan = EntryPlan {
        operation: WorkHourOperation::Void,
        hours_delta: -signup.granted_hours,
        service_count_delta: -1,
        idempotency_key: key,
        reason,
        operator_id: actor.account_id,
        work_hour_status: WorkHourStatus::Voided,
        granted_hours: 0.0,
        granted_at: None,
        check_in_time: None,
        check_out_time: None,
    };

    match append_entry(conn, &signup, plan, now).await? {
        Appended::Applied { log_id } => Ok(LedgerOutcome {
            log_id,
            granted_hours: 0.0,
            replayed: false,
        }),
        Appended::KeyTaken(existing) => {
            check_replay(&existing, signup_id, WorkHourOperation::Void, actor.account_id)
        }
    }
}

async fn recalculate_in_tx(
    conn: &mut SqliteConnection,
    actor: &Actor,
    signup_id: i64,
    target: Option<f64>,
    key: String,
    reason: String,
    now: DateTime<Utc>,
) -> LedgerResult<LedgerOutcome> {
    let signup = signups::lock_signup(&mut *conn, signup_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("signup"))?;

    if let Some(existing) = work_hours::find_log_by_key(&mut *conn, &key).await? {
        return check_replay(&existing, signup_id, WorkHourOperation::Regrant, actor.account_id);
    }

    let (activity, _) = service::operable_activity(&mut *conn, actor, signup.activity_id).await?;
    let (check_in, check_out) = match (signup.checked_in_at(), signup.check_out_status, signup.check_out_time) {
        (Some(check_in), CheckStatus::Done, Some(check_out)) => (check_in, check_out),
        _ => {
            return Err(LedgerError::conflict(format!(
                "signup {} has not completed check-in and check-out",
                signup.id
            )))
        }
    };
    if activity.status == ActivityStatus::Canceled {
        return Err(LedgerError::conflict(format!(
            "activity {} is canceled",
            activity.id
        )));
    }
    verify_chain(&mut *conn, &signup).await?;

    let target_hours = match target {
        Some(hours) => round_hours(hours),
        None => calc_granted_hours(activity.duration, check_in, check_out),
    };
    let hours_delta = round_hours(target_hours - signup.granted_hours);
    let service_count_delta = if signup.work_hour_status == WorkHourStatus::Granted { 0 } else { 1 };

    if hours_delta == 0.0 && service_count_delta == 0 {
        let log_id = signup.last_work_hour_log_id.ok_or_else(|| {
            LedgerError::chain_broken(signup.id, "granted signup without a last log")
        })?;
        return Ok(LedgerOutcome {
            log_id,
            granted_hours: signup.granted_hours,
            replayed: false,
        });
    }

    let plan = EntryPlan {
        operation: WorkHourOperation::Regrant,
        hours_delta,
        service_count_delta,
        idempotency_key: key,
        reason,
        operator_id: actor.account_id,
        work_hour_status: WorkHourStatus::Granted,
        granted_hours: target_hours,
        granted_at: Some(now),
        check_in_time: None,
        check_out_time: None,
    };

    match append_entry(conn, &signup, plan, now).await? {
        Appended::Applied { log_id } => Ok(LedgerOutcome {
            log_id,
            granted_hours: target_hours,
            replayed: false,
        }),
        Appended::KeyTaken(existing) => {
            check_replay(&existing, signup_id, WorkHourOperation::Regrant, actor.account_id)
        }
    }
}
