//! Per-target approval handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::snapshot::{require_id, MembershipSnapshot, SignupSnapshot};
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{
    AuditOperation, AuditRecord, AuditTargetType, MemberRole, MemberStatus, SignupStatus,
    VerificationStatus,
};
use crate::repository::memberships::{self, MembershipPatch, NewMembership};
use crate::repository::{activities, organizations, signups, volunteers};

/// Materializes an approved record. Runs inside the approval transaction,
/// after the record itself has been claimed.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        now: DateTime<Utc>,
    ) -> LedgerResult<()>;
}

pub struct IdentityApproval;
pub struct OrganizationApproval;
pub struct MembershipApproval;
pub struct SignupApproval;

/// Handler for a target type. Exhaustive over the closed set.
pub fn handler_for(target: AuditTargetType) -> &'static dyn ApprovalHandler {
    match target {
        AuditTargetType::Identity => &IdentityApproval,
        AuditTargetType::Organization => &OrganizationApproval,
        AuditTargetType::Membership => &MembershipApproval,
        AuditTargetType::Signup => &SignupApproval,
    }
}

fn target_id(record: &AuditRecord) -> LedgerResult<i64> {
    require_id(record.id, "target_id", record.target_id)
}

#[async_trait]
impl ApprovalHandler for IdentityApproval {
    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        _now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let volunteer_id = target_id(record)?;
        if !volunteers::set_volunteer_audit_status(&mut *conn, volunteer_id, VerificationStatus::Approved)
            .await?
        {
            return Err(LedgerError::not_found("volunteer"));
        }
        info!(record_id = record.id, volunteer_id, "Volunteer identity verified");
        Ok(())
    }
}

#[async_trait]
impl ApprovalHandler for OrganizationApproval {
    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        _now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let org_id = target_id(record)?;
        if !organizations::set_organization_audit_status(&mut *conn, org_id, VerificationStatus::Approved)
            .await?
        {
            return Err(LedgerError::not_found("organization"));
        }
        info!(record_id = record.id, org_id, "Organization verified");
        Ok(())
    }
}

#[async_trait]
impl ApprovalHandler for MembershipApproval {
    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let snapshot = MembershipSnapshot::parse(record.id, &record.new_content)?;

        match record.operation_type {
            AuditOperation::Create => {
                let (org_id, volunteer_id) = snapshot.pair(record.id)?;
                let member = NewMembership {
                    org_id,
                    volunteer_id,
                    role: snapshot.role.unwrap_or(MemberRole::Member),
                    status: MemberStatus::Active,
                    applied_at: snapshot.applied_at.unwrap_or(now),
                    joined_at: Some(snapshot.joined_at.unwrap_or(now)),
                };
                let created = match memberships::insert_membership(&mut *conn, &member).await {
                    Ok(created) => created,
                    Err(err) if err.is_unique_violation() => {
                        return Err(LedgerError::DuplicateMembership { org_id, volunteer_id })
                    }
                    Err(err) => return Err(err),
                };
                info!(record_id = record.id, membership_id = created.id, org_id, volunteer_id, "Membership created");
            }
            AuditOperation::Update => {
                let member_id = match snapshot.id.filter(|id| *id > 0) {
                    Some(id) => id,
                    None => target_id(record)?,
                };
                let joined_at = match (snapshot.status, snapshot.joined_at) {
                    (Some(MemberStatus::Active), None) => Some(now),
                    (_, joined_at) => joined_at,
                };
                let patch = MembershipPatch {
                    org_id: snapshot.org_id.filter(|id| *id > 0),
                    volunteer_id: snapshot.volunteer_id.filter(|id| *id > 0),
                    role: snapshot.role,
                    status: snapshot.status,
                    applied_at: snapshot.applied_at,
                    joined_at,
                };
                if memberships::find_membership(&mut *conn, member_id).await?.is_none() {
                    return Err(LedgerError::not_found("membership"));
                }
                if !patch.is_empty() {
                    memberships::update_membership(&mut *conn, member_id, &patch).await?;
                }
                info!(record_id = record.id, membership_id = member_id, "Membership updated");
            }
            AuditOperation::Delete => {
                let member_id = match record.target_id {
                    Some(id) if id > 0 => id,
                    _ => require_id(record.id, "id", snapshot.id)?,
                };
                if !memberships::set_membership_status(&mut *conn, member_id, MemberStatus::Left).await? {
                    return Err(LedgerError::not_found("membership"));
                }
                info!(record_id = record.id, membership_id = member_id, "Membership ended");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ApprovalHandler for SignupApproval {
    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        record: &AuditRecord,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if record.operation_type != AuditOperation::Create || record.target_id.is_some() {
            let signup_id = target_id(record)?;
            if !signups::set_signup_status(&mut *conn, signup_id, SignupStatus::Success).await? {
                return Err(LedgerError::not_found("signup"));
            }
            info!(record_id = record.id, signup_id, "Signup approved");
            return Ok(());
        }

        let snapshot = SignupSnapshot::parse(record.id, &record.new_content)?;
        let (activity_id, volunteer_id) = snapshot.pair(record.id)?;

        if activities::find_activity(&mut *conn, activity_id).await?.is_none() {
            return Err(LedgerError::not_found("activity"));
        }

        let signup_id = match signups::lock_signup_by_pair(&mut *conn, activity_id, volunteer_id).await? {
            Some(existing) if existing.status == SignupStatus::Success => {
                debug!(record_id = record.id, signup_id = existing.id, "Signup already approved");
                return Ok(());
            }
            Some(existing) => {
                signups::reopen_signup(&mut *conn, existing.id).await?;
                existing.id
            }
            None => {
                signups::insert_signup(&mut *conn, activity_id, volunteer_id, SignupStatus::Success, now)
                    .await?
                    .id
            }
        };

        if !activities::increment_people(&mut *conn, activity_id).await? {
            return Err(LedgerError::conflict(format!(
                "activity {activity_id} has no remaining capacity"
            )));
        }

        info!(record_id = record.id, signup_id, activity_id, volunteer_id, "Signup materialized");
        Ok(())
    }
}
