use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, LimitsConfig};
use crate::database::{RetryPolicy, TransactionRunner};
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{Activity, Actor, Organization, Volunteer};
use crate::repository::{activities, organizations, volunteers};

/// Dependencies shared by every service: storage, retry policy, clock and
/// input limits. Cheap to clone.
#[derive(Clone)]
pub struct ServiceContext {
    pub pool: SqlitePool,
    pub runner: TransactionRunner,
    pub clock: Arc<dyn Clock>,
    pub limits: LimitsConfig,
}

impl ServiceContext {
    pub fn new(pool: SqlitePool, config: &LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let runner = TransactionRunner::new(pool.clone(), RetryPolicy::from(&config.retry));
        Self {
            pool,
            runner,
            clock,
            limits: config.limits.clone(),
        }
    }

    pub fn with_system_clock(pool: SqlitePool, config: &LedgerConfig) -> Self {
        Self::new(pool, config, Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Trim and bound a free-text reason.
    pub(crate) fn validate_reason(&self, reason: &str) -> LedgerResult<String> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("reason is required"));
        }
        if reason.chars().count() > self.limits.max_reason_chars {
            return Err(LedgerError::validation(format!(
                "reason exceeds {} characters",
                self.limits.max_reason_chars
            )));
        }
        Ok(reason.to_string())
    }

    pub(crate) fn validate_idempotency_key(&self, key: &str) -> LedgerResult<String> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LedgerError::validation("idempotency key is required"));
        }
        if key.chars().count() > self.limits.max_idempotency_key_chars {
            return Err(LedgerError::validation(format!(
                "idempotency key exceeds {} characters",
                self.limits.max_idempotency_key_chars
            )));
        }
        Ok(key.to_string())
    }
}

/// Volunteer profile of the acting account.
pub(crate) async fn acting_volunteer(
    conn: &mut SqliteConnection,
    actor: &Actor,
) -> LedgerResult<Volunteer> {
    actor.require_volunteer()?;
    volunteers::find_volunteer_by_account(&mut *conn, actor.account_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("volunteer"))
}

/// Organization profile of the acting account.
pub(crate) async fn acting_organization(
    conn: &mut SqliteConnection,
    actor: &Actor,
) -> LedgerResult<Organization> {
    actor.require_organization()?;
    organizations::find_organization_by_account(&mut *conn, actor.account_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("organization"))
}

pub(crate) async fn load_activity(conn: &mut SqliteConnection, activity_id: i64) -> LedgerResult<Activity> {
    activities::find_activity(&mut *conn, activity_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("activity"))
}

/// Activity owned by the acting organization.
pub(crate) async fn operable_activity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    activity_id: i64,
) -> LedgerResult<(Activity, Organization)> {
    let activity = load_activity(&mut *conn, activity_id).await?;
    let org = acting_organization(&mut *conn, actor).await?;
    if activity.org_id != org.id {
        return Err(LedgerError::PermissionDenied(format!(
            "activity {} does not belong to organization {}",
            activity.id, org.id
        )));
    }
    Ok((activity, org))
}
