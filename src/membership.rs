//! Organization membership requests. Joining and leaving both go through
//! review; approval is handled by the membership approval handler.

use tracing::info;

use crate::audit::{self, MembershipSnapshot, Snapshot};
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{Actor, AuditOperation, AuditTargetType, MemberRole, MemberStatus};
use crate::repository::{audits, memberships, organizations, volunteers};
use crate::service::{self, ServiceContext};

#[derive(Clone)]
pub struct MembershipService {
    ctx: ServiceContext,
}

impl MembershipService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Ask to join an organization. Returns the pending record id.
    pub async fn request_join(&self, actor: &Actor, org_id: i64) -> LedgerResult<i64> {
        let volunteer = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_volunteer(&mut conn, actor).await?
        };
        let volunteer_id = volunteer.id;
        let creator_id = actor.account_id;
        let now = self.ctx.now();

        let record_id = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    // Serializes concurrent requests from the same volunteer.
                    volunteers::lock_volunteer(&mut *conn, volunteer_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("volunteer"))?;
                    if organizations::find_organization(&mut *conn, org_id).await?.is_none() {
                        return Err(LedgerError::not_found("organization"));
                    }
                    if memberships::find_membership_by_pair(&mut *conn, org_id, volunteer_id)
                        .await?
                        .is_some()
                    {
                        return Err(LedgerError::DuplicateMembership { org_id, volunteer_id });
                    }

                    let proposal = Snapshot::Membership(MembershipSnapshot {
                        org_id: Some(org_id),
                        volunteer_id: Some(volunteer_id),
                        role: Some(MemberRole::Member),
                        status: Some(MemberStatus::Active),
                        applied_at: Some(now),
                        ..MembershipSnapshot::default()
                    });
                    if audit::has_pending_create(&mut *conn, &proposal).await? {
                        return Err(LedgerError::DuplicateMembership { org_id, volunteer_id });
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
            .await?;

        info!(record_id, org_id, volunteer_id, "Membership join requested");
        Ok(record_id)
    }

    /// Ask to leave an organization. Only the member may ask.
    pub async fn request_leave(&self, actor: &Actor, membership_id: i64) -> LedgerResult<i64> {
        let volunteer = {
            let mut conn = self.ctx.pool.acquire().await?;
            service::acting_volunteer(&mut conn, actor).await?
        };
        let volunteer_id = volunteer.id;
        let creator_id = actor.account_id;
        let now = self.ctx.now();

        let record_id = self
            .ctx
            .runner
            .with_transaction(move |conn| {
                Box::pin(async move {
                    volunteers::lock_volunteer(&mut *conn, volunteer_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("volunteer"))?;
                    let member = memberships::find_membership(&mut *conn, membership_id)
                        .await?
                        .ok_or_else(|| LedgerError::not_found("membership"))?;
                    if member.volunteer_id != volunteer_id {
                        return Err(LedgerError::PermissionDenied(format!(
                            "membership {membership_id} belongs to another volunteer"
                        )));
                    }
                    if member.status == MemberStatus::Left {
                        return Err(LedgerError::conflict(format!(
                            "membership {membership_id} has already ended"
                        )));
                    }
                    if audits::has_pending_for_target(&mut *conn, AuditTargetType::Membership, membership_id)
                        .await?
                    {
                        return Err(LedgerError::conflict(format!(
                            "membership {membership_id} already has a pending request"
                        )));
                    }

                    let current = MembershipSnapshot {
                        id: Some(member.id),
                        org_id: Some(member.org_id),
                        volunteer_id: Some(member.volunteer_id),
                        role: Some(member.role),
                        status: Some(member.status),
                        applied_at: Some(member.applied_at),
                        joined_at: member.joined_at,
                    };
                    let departed = MembershipSnapshot {
                        status: Some(MemberStatus::Left),
                        ..current.clone()
                    };

                    audit::submit(
                        &mut *conn,
                        Some(membership_id),
                        AuditOperation::Delete,
                        creator_id,
                        Some(&Snapshot::Membership(current)),
                        &Snapshot::Membership(departed),
                        now,
                    )
                    .await
                })
            })
            .await?;

        info!(record_id, membership_id, volunteer_id, "Membership leave requested");
        Ok(record_id)
    }
}
