//! Audit workflow: pending proposals that a reviewer approves (materializing
//! the change through a per-target handler) or rejects.

pub mod handlers;
pub mod snapshot;

pub use handlers::{handler_for, ApprovalHandler};
pub use snapshot::{
    IdentitySnapshot, MembershipSnapshot, OrganizationSnapshot, SignupSnapshot, Snapshot,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::{info, warn};

use crate::errors::{LedgerError, LedgerResult};
use crate::models::{
    Actor, AuditOperation, AuditRecord, AuditResult, AuditStatus, AuditTargetType, Page,
    PageRequest,
};
use crate::repository::audits::{self, JoinQueueFilter, NewAuditRecord, Resolution};
use crate::repository::{organizations, volunteers};
use crate::service::{self, ServiceContext};

/// Write a pending proposal. `old` defaults to an empty object.
pub(crate) async fn submit<'e, E>(
    executor: E,
    target_id: Option<i64>,
    operation: AuditOperation,
    creator_id: i64,
    old: Option<&Snapshot>,
    new: &Snapshot,
    now: DateTime<Utc>,
) -> LedgerResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let record = NewAuditRecord {
        target_type: new.target_type(),
        target_id,
        operation_type: operation,
        creator_id,
        old_content: match old {
            Some(old) => old.to_json()?,
            None => "{}".to_string(),
        },
        new_content: new.to_json()?,
        subject: new.subject(),
    };
    audits::insert_audit_record(executor, &record, now).await
}

/// Whether a pending "create" proposal for the same subject exists. Index
/// candidates are confirmed against their parsed snapshots.
pub(crate) async fn has_pending_create(
    conn: &mut SqliteConnection,
    proposed: &Snapshot,
) -> LedgerResult<bool> {
    let target = proposed.target_type();
    let subject = proposed.subject();
    let candidates = audits::pending_creates_for_subject(&mut *conn, target, subject).await?;

    for candidate in candidates {
        if candidate.target_id.is_some() {
            continue;
        }
        let parsed = Snapshot::parse(target, candidate.id, &candidate.new_content)?;
        if parsed.subject() == subject {
            return Ok(true);
        }
        warn!(
            record_id = candidate.id,
            "Pending record subject columns disagree with its snapshot"
        );
    }
    Ok(false)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    /// Empty means pending only
    #[serde(default)]
    pub statuses: Vec<AuditStatus>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub page: PageRequest,
}

/// Membership-join proposal rendered for review.
#[derive(Debug, Clone, Serialize)]
pub struct PendingJoin {
    pub record_id: i64,
    pub org_id: i64,
    pub org_name: String,
    pub volunteer_id: i64,
    pub real_name: String,
    pub status: AuditStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditService {
    ctx: ServiceContext,
}

impl AuditService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Load a pending record and validate it can be resolved.
    async fn resolvable(&self, record_id: i64) -> LedgerResult<(AuditRecord, AuditTargetType)> {
        let record = audits::find_audit_record(&self.ctx.pool, record_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("audit record"))?;
        let target = record.target()?;
        if !record.is_pending() {
            return Err(LedgerError::AlreadyProcessed { record_id });
        }
        Ok((record, target))
    }

    /// Approve a pending record and materialize it. The optional reason is
    /// kept as the reviewer's comment.
    pub async fn approve(
        &self,
        actor: &Actor,
        record_id: i64,
        reason: Option<&str>,
    ) -> LedgerResult<AuditRecord> {
        let comment = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => Some(self.ctx.validate_reason(reason)?),
            None => None,
        };
        actor.require_organization()?;
        let (record, target) = self.resolvable(record_id).await?;

        let resolution = Resolution {
            status: AuditStatus::Approved,
            result: AuditResult::Pass,
            auditor_id: actor.account_id,
            reject_reason: comment,
            audit_time: self.ctx.now(),
        };
        let result = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                let record = record.clone();
                let resolution = resolution.clone();
                Box::pin(async move {
                    if !audits::resolve_pending(&mut *conn, record.id, &resolution).await? {
                        return Err(LedgerError::AlreadyProcessed { record_id: record.id });
                    }
                    handler_for(target).apply(conn, &record, resolution.audit_time).await
                })
            })
            .await;

        if let Err(err) = &result {
            warn!(record_id, target = %target, error = %err, "Audit approval failed");
        }
        result?;

        info!(record_id, target = %target, auditor_id = actor.account_id, "Audit record approved");
        self.record(record_id).await
    }

    /// Reject a pending record. Nothing is materialized.
    pub async fn reject(&self, actor: &Actor, record_id: i64, reason: &str) -> LedgerResult<AuditRecord> {
        let reason = self.ctx.validate_reason(reason)?;
        actor.require_organization()?;
        let (_, target) = self.resolvable(record_id).await?;

        let resolution = Resolution {
            status: AuditStatus::Rejected,
            result: AuditResult::Reject,
            auditor_id: actor.account_id,
            reject_reason: Some(reason),
            audit_time: self.ctx.now(),
        };
        self.ctx
            .runner
            .with_transaction(move |conn| {
                let resolution = resolution.clone();
                Box::pin(async move {
                    if !audits::resolve_pending(&mut *conn, record_id, &resolution).await? {
                        return Err(LedgerError::AlreadyProcessed { record_id });
                    }
                    Ok(())
                })
            })
            .await?;

        info!(record_id, target = %target, auditor_id = actor.account_id, "Audit record rejected");
        self.record(record_id).await
    }

    pub async fn record(&self, record_id: i64) -> LedgerResult<AuditRecord> {
        audits::find_audit_record(&self.ctx.pool, record_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("audit record"))
    }

    /// Ask for real-name verification of the acting volunteer.
    pub async fn submit_identity_verification(&self, actor: &Actor, real_name: &str) -> LedgerResult<i64> {
        let real_name = real_name.trim().to_string();
        if real_name.is_empty() {
            return Err(LedgerError::validation("real name is required"));
        }
        let volunteer_id = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_volunteer(&mut conn, actor).await?.id
        };
        let creator_id = actor.account_id;
        let now = self.ctx.now();

        let record_id = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                let real_name = real_name.clone();
                Box::pin(async move {
                    let volunteer = volunteers::lock_volunteer(&mut *conn, volunteer_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("volunteer"))?;
                    if audits::has_pending_for_target(&mut *conn, AuditTargetType::Identity, volunteer_id).await? {
                        return Err(LedgerError::conflict(format!(
                            "volunteer {volunteer_id} already has a pending verification"
                        )));
                    }

                    let old = Snapshot::Identity(IdentitySnapshot {
                        volunteer_id: Some(volunteer_id),
                        real_name: Some(volunteer.real_name),
                    });
                    let new = Snapshot::Identity(IdentitySnapshot {
                        volunteer_id: Some(volunteer_id),
                        real_name: Some(real_name),
                    });
                    submit(
                        &mut *conn,
                        Some(volunteer_id),
                        AuditOperation::Update,
                        creator_id,
                        Some(&old),
                        &new,
                        now,
                    )
                    .await
                })
            })
            .await?;

        info!(record_id, volunteer_id, "Identity verification submitted");
        Ok(record_id)
    }

    /// Ask for qualification verification of the acting organization.
    pub async fn submit_organization_verification(&self, actor: &Actor) -> LedgerResult<i64> {
        let org_id = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_organization(&mut conn, actor).await?.id
        };
        let creator_id = actor.account_id;
        let now = self.ctx.now();

        let record_id = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let org = organizations::lock_organization(&mut *conn, org_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("organization"))?;
                    if audits::has_pending_for_target(&mut *conn, AuditTargetType::Organization, org_id).await? {
                        return Err(LedgerError::conflict(format!(
                            "organization {org_id} already has a pending verification"
                        )));
                    }

                    let snapshot = Snapshot::Organization(OrganizationSnapshot {
                        org_id: Some(org_id),
                        org_name: Some(org.org_name),
                    });
                    submit(
                        &mut *conn,
                        Some(org_id),
                        AuditOperation::Update,
                        creator_id,
                        Some(&snapshot),
                        &snapshot,
                        now,
                    )
                    .await
                })
            })
            .await?;

        info!(record_id, org_id, "Organization verification submitted");
        Ok(record_id)
    }

    /// Membership-join proposals addressed to the acting organization.
    ///
    /// Fails on the first record whose snapshot is malformed or names a
    /// volunteer or organization that does not exist.
    pub async fn list_pending_membership_joins(
        &self,
        actor: &Actor,
        request: JoinQueueRequest,
    ) -> LedgerResult<Page<PendingJoin>> {
        let (page, page_size, offset) = request.page.resolve(&self.ctx.limits);
        let org = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_organization(&mut conn, actor).await?
        };

        let filter = JoinQueueFilter {
            org_id: org.id,
            statuses: if request.statuses.is_empty() {
                vec![AuditStatus::Pending]
            } else {
                request.statuses
            },
            keyword: request
                .keyword
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        };
        let (records, total) =
            audits::list_membership_joins(&self.ctx.pool, &filter, i64::from(page_size), offset).await?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let snapshot = MembershipSnapshot::parse(record.id, &record.new_content)?;
            let (org_id, volunteer_id) = snapshot.pair(record.id)?;
            if Some(org_id) != record.subject_org_id || Some(volunteer_id) != record.subject_volunteer_id {
                return Err(LedgerError::SnapshotInvalid {
                    record_id: record.id,
                    reason: "snapshot disagrees with indexed subject".to_string(),
                });
            }

            let volunteer = volunteers::find_volunteer(&self.ctx.pool, volunteer_id)
                .await?
                .ok_or_else(|| LedgerError::SnapshotInvalid {
                    record_id: record.id,
                    reason: format!("volunteer {volunteer_id} does not exist"),
                })?;
            let organization = organizations::find_organization(&self.ctx.pool, org_id)
                .await?
                .ok_or_else(|| LedgerError::SnapshotInvalid {
                    record_id: record.id,
                    reason: format!("organization {org_id} does not exist"),
                })?;

            items.push(PendingJoin {
                record_id: record.id,
                org_id,
                org_name: organization.org_name,
                volunteer_id,
                real_name: volunteer.real_name,
                status: record.status,
                applied_at: snapshot.applied_at,
                created_at: record.created_at,
            });
        }

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }
}
