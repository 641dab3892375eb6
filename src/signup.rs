//! Activity signup lifecycle: proposal, cancellation, attendance and the
//! settlement that turns attendance into granted hours.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::audit::{self, SignupSnapshot, Snapshot};
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::{self, calc_granted_hours, GrantEntry};
use crate::models::{ActivitySignup, ActivityStatus, Actor, AuditOperation, SignupStatus};
use crate::repository::{activities, signups};
use crate::service::{self, ServiceContext};

const CHECKOUT_REASON: &str = "automatic settlement on check-out";
const SUPPLEMENT_REASON: &str = "attendance supplemented by organization";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignupAccepted {
    /// Pending audit record carrying the proposal
    pub record_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CheckIn {
    pub check_in_time: DateTime<Utc>,
}

/// Settled attendance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attendance {
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: DateTime<Utc>,
    pub granted_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementRequest {
    pub activity_id: i64,
    pub volunteer_id: i64,
    /// Required unless the volunteer already checked in
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct SignupService {
    ctx: ServiceContext,
}

fn settled_attendance(signup: &ActivitySignup) -> LedgerResult<Attendance> {
    match (signup.check_in_time, signup.check_out_time) {
        (Some(check_in_time), Some(check_out_time)) => Ok(Attendance {
            check_in_time,
            check_out_time,
            granted_hours: signup.granted_hours,
        }),
        _ => Err(LedgerError::conflict(format!(
            "signup {} is checked out without attendance times",
            signup.id
        ))),
    }
}

fn require_success(signup: &ActivitySignup, action: &str) -> LedgerResult<()> {
    if signup.status != SignupStatus::Success {
        return Err(LedgerError::conflict(format!(
            "cannot {action} signup {} in status {:?}",
            signup.id, signup.status
        )));
    }
    Ok(())
}

fn refuse_canceled(activity_id: i64, status: ActivityStatus) -> LedgerResult<()> {
    if status == ActivityStatus::Canceled {
        return Err(LedgerError::conflict(format!("activity {activity_id} is canceled")));
    }
    Ok(())
}

async fn lock_pair(
    conn: &mut SqliteConnection,
    activity_id: i64,
    volunteer_id: i64,
) -> LedgerResult<ActivitySignup> {
    signups::lock_signup_by_pair(&mut *conn, activity_id, volunteer_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("signup"))
}

impl SignupService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Propose a signup. Nothing is materialized until the proposal is approved.
    pub async fn signup(&self, actor: &Actor, activity_id: i64) -> LedgerResult<SignupAccepted> {
        let volunteer = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_volunteer(&mut conn, actor).await?
        };
        let volunteer_id = volunteer.id;
        let creator_id = actor.account_id;
        let now = self.ctx.now();

        let result = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let activity = activities::lock_activity(&mut *conn, activity_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("activity"))?;
                    if activity.status != ActivityStatus::Recruiting {
                        return Err(LedgerError::conflict(format!(
                            "activity {activity_id} is not recruiting"
                        )));
                    }
                    if !activity.has_capacity() {
                        return Err(LedgerError::conflict(format!("activity {activity_id} is full")));
                    }

                    // Materialized signups first, then proposals still under review.
                    if let Some(existing) =
                        signups::find_signup_by_pair(&mut *conn, activity_id, volunteer_id).await?
                    {
                        if existing.status.is_active() {
                            return Err(LedgerError::DuplicateSignup { activity_id, volunteer_id });
                        }
                    }
                    let proposal = Snapshot::Signup(SignupSnapshot {
                        activity_id: Some(activity_id),
                        volunteer_id: Some(volunteer_id),
                        status: Some(SignupStatus::Pending),
                    });
                    if audit::has_pending_create(&mut *conn, &proposal).await? {
                        return Err(LedgerError::DuplicateSignup { activity_id, volunteer_id });
                    }

                    audit::submit(
                        &mut *conn,
                        None,
                        AuditOperation::Create,
                        creator_id,
                        None,
                        &proposal,
                        now,
                    )
                    .await
                })
            })
            .await;

        match result {
            Ok(record_id) => {
                info!(activity_id, volunteer_id, record_id, "Signup submitted for review");
                Ok(SignupAccepted { record_id })
            }
            Err(err) => {
                warn!(activity_id, volunteer_id, error = %err, "Signup refused");
                Err(err)
            }
        }
    }

    /// Cancel a pending or successful signup and release its seat.
    pub async fn cancel(&self, actor: &Actor, activity_id: i64) -> LedgerResult<()> {
        let volunteer = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_volunteer(&mut conn, actor).await?
        };
        let volunteer_id = volunteer.id;

        let signup_id = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let signup = lock_pair(&mut *conn, activity_id, volunteer_id).await?;
                    if !signup.status.is_active() {
                        return Err(LedgerError::conflict(format!(
                            "cannot cancel signup {} in status {:?}",
                            signup.id, signup.status
                        )));
                    }
                    if !signups::cancel_signup(&mut *conn, signup.id).await? {
                        return Err(LedgerError::conflict(format!(
                            "signup {} changed while canceling",
                            signup.id
                        )));
                    }
                    if !activities::decrement_people(&mut *conn, activity_id).await? {
                        return Err(LedgerError::not_found("activity"));
                    }
                    Ok(signup.id)
                })
            })
            .await?;

        info!(activity_id, volunteer_id, signup_id, "Signup canceled");
        Ok(())
    }

    /// Record arrival. Repeating a check-in returns the original time.
    pub async fn check_in(&self, actor: &Actor, activity_id: i64) -> LedgerResult<CheckIn> {
        let (volunteer, activity) = {
            let mut conn = self.ctx.pool.acquire().await?;
            let volunteer = service::acting_volunteer(&mut conn, actor).await?;
            let activity = service::load_activity(&mut conn, activity_id).await?;
            (volunteer, activity)
        };
        refuse_canceled(activity.id, activity.status)?;
        let volunteer_id = volunteer.id;
        let now = self.ctx.now();

        let check_in_time = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let signup = lock_pair(&mut *conn, activity_id, volunteer_id).await?;
                    require_success(&signup, "check in")?;
                    if signup.is_checked_out() {
                        return Err(LedgerError::conflict(format!(
                            "signup {} is already checked out",
                            signup.id
                        )));
                    }
                    if let Some(existing) = signup.checked_in_at() {
                        return Ok(existing);
                    }
                    signups::mark_checked_in(&mut *conn, signup.id, now).await?;
                    Ok(now)
                })
            })
            .await?;

        info!(activity_id, volunteer_id, %check_in_time, "Checked in");
        Ok(CheckIn { check_in_time })
    }

    /// Record departure and settle the attendance through the ledger.
    /// Repeating a check-out returns the original settlement.
    pub async fn check_out(&self, actor: &Actor, activity_id: i64) -> LedgerResult<Attendance> {
        let (volunteer, activity) = {
            let mut conn = self.ctx.pool.acquire().await?;
            let volunteer = service::acting_volunteer(&mut conn, actor).await?;
            let activity = service::load_activity(&mut conn, activity_id).await?;
            (volunteer, activity)
        };
        refuse_canceled(activity.id, activity.status)?;
        let volunteer_id = volunteer.id;
        let duration = activity.duration;
        let operator_id = actor.account_id;
        let clock_now = self.ctx.now();

        let attendance = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let signup = lock_pair(&mut *conn, activity_id, volunteer_id).await?;
                    require_success(&signup, "check out")?;
                    let check_in_time = signup.checked_in_at().ok_or_else(|| {
                        LedgerError::conflict(format!("signup {} is not checked in", signup.id))
                    })?;
                    if signup.is_checked_out() {
                        return settled_attendance(&signup);
                    }

                    let check_out_time = clock_now.max(check_in_time);
                    let granted_hours = calc_granted_hours(duration, check_in_time, check_out_time);
                    let entry = GrantEntry {
                        hours: granted_hours,
                        idempotency_key: format!(
                            "checkout:{}:{}",
                            signup.id,
                            signup.work_hour_version + 1
                        ),
                        reason: CHECKOUT_REASON.to_string(),
                        operator_id,
                        check_in_time: None,
                        check_out_time,
                        granted_at: check_out_time,
                    };
                    ledger::grant(conn, &signup, entry, clock_now).await?;

                    Ok(Attendance {
                        check_in_time,
                        check_out_time,
                        granted_hours,
                    })
                })
            })
            .await?;

        info!(
            activity_id,
            volunteer_id,
            granted_hours = attendance.granted_hours,
            "Checked out"
        );
        Ok(attendance)
    }

    /// Backfill a missing check-in/check-out pair on behalf of a volunteer.
    pub async fn supplement_attendance(
        &self,
        actor: &Actor,
        request: SupplementRequest,
    ) -> LedgerResult<Attendance> {
        let reason = match request.reason.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => self.ctx.validate_reason(reason)?,
            _ => SUPPLEMENT_REASON.to_string(),
        };
        let activity = {
            let mut conn = self.ctx.pool.acquire().await?;
            let (activity, _) = service::operable_activity(&mut conn, actor, request.activity_id).await?;
            activity
        };
        refuse_canceled(activity.id, activity.status)?;

        let activity_id = request.activity_id;
        let volunteer_id = request.volunteer_id;
        let requested_check_in = request.check_in_time;
        let check_out_time = request.check_out_time;
        let duration = activity.duration;
        let operator_id = actor.account_id;
        let now = self.ctx.now();

        let attendance = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                let reason = reason.clone();
                Box::pin(async move {
                    let signup = lock_pair(&mut *conn, activity_id, volunteer_id).await?;
                    require_success(&signup, "supplement attendance for")?;
                    if signup.is_checked_out() {
                        return settled_attendance(&signup);
                    }

                    let check_in_time = match (signup.checked_in_at(), requested_check_in) {
                        (Some(existing), Some(requested)) if existing != requested => {
                            return Err(LedgerError::conflict(format!(
                                "signup {} already checked in at {existing}",
                                signup.id
                            )))
                        }
                        (Some(existing), _) => existing,
                        (None, Some(requested)) => requested,
                        (None, None) => {
                            return Err(LedgerError::validation(
                                "check-in time is required when the volunteer never checked in",
                            ))
                        }
                    };
                    if check_out_time < check_in_time {
                        return Err(LedgerError::validation("check-out precedes check-in"));
                    }

                    let granted_hours = calc_granted_hours(duration, check_in_time, check_out_time);
                    let entry = GrantEntry {
                        hours: granted_hours,
                        idempotency_key: format!(
                            "supplement:{}:{}:{}",
                            signup.id,
                            signup.work_hour_version + 1,
                            check_out_time.timestamp()
                        ),
                        reason,
                        operator_id,
                        check_in_time: Some(check_in_time),
                        check_out_time,
                        granted_at: check_out_time,
                    };
                    ledger::grant(conn, &signup, entry, now).await?;

                    Ok(Attendance {
                        check_in_time,
                        check_out_time,
                        granted_hours,
                    })
                })
            })
            .await?;

        info!(
            activity_id,
            volunteer_id,
            operator_id,
            granted_hours = attendance.granted_hours,
            "Attendance supplemented"
        );
        Ok(attendance)
    }
}
