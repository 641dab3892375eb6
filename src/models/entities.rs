use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::*;
use crate::errors::LedgerResult;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: i64,
    pub account_id: i64,
    pub org_name: String,
    pub audit_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Volunteer profile subset; `total_hours` and `service_count` are only ever
/// written by the work-hour ledger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Volunteer {
    pub id: i64,
    pub account_id: i64,
    pub real_name: String,
    pub audit_status: VerificationStatus,
    pub total_hours: f64,
    pub service_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: i64,
    pub org_id: i64,
    pub title: String,
    /// Hour ceiling for a single attendance; 0 means uncapped
    pub duration: f64,
    /// 0 means unlimited
    pub max_people: i64,
    pub current_people: i64,
    pub status: ActivityStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn has_capacity(&self) -> bool {
        self.max_people == 0 || self.current_people < self.max_people
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivitySignup {
    pub id: i64,
    pub activity_id: i64,
    pub volunteer_id: i64,
    pub status: SignupStatus,
    pub signup_time: DateTime<Utc>,
    pub check_in_status: CheckStatus,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_status: CheckStatus,
    pub check_out_time: Option<DateTime<Utc>>,
    pub work_hour_status: WorkHourStatus,
    pub work_hour_version: i64,
    pub last_work_hour_log_id: Option<i64>,
    pub granted_hours: f64,
    pub granted_at: Option<DateTime<Utc>>,
}

impl ActivitySignup {
    /// Check-in time, present only when the check-in leg is done.
    pub fn checked_in_at(&self) -> Option<DateTime<Utc>> {
        match self.check_in_status {
            CheckStatus::Done => self.check_in_time,
            CheckStatus::Pending => None,
        }
    }

    pub fn is_checked_out(&self) -> bool {
        self.check_out_status == CheckStatus::Done
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkHourLog {
    pub id: i64,
    pub volunteer_id: i64,
    pub activity_id: i64,
    pub signup_id: i64,
    pub operation_type: WorkHourOperation,
    pub hours_delta: f64,
    pub service_count_delta: i64,
    pub before_total_hours: f64,
    pub after_total_hours: f64,
    pub before_service_count: i64,
    pub after_service_count: i64,
    pub work_hour_version: i64,
    /// Settled hours on the signup once this entry applied
    pub granted_hours: f64,
    pub idempotency_key: String,
    pub ref_log_id: Option<i64>,
    pub reason: String,
    pub operator_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrgMember {
    pub id: i64,
    pub org_id: i64,
    pub volunteer_id: i64,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub applied_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    /// Raw target type text; see [`AuditRecord::target`]
    pub target_type: String,
    /// `None` while a "create" proposal has not materialized
    pub target_id: Option<i64>,
    pub operation_type: AuditOperation,
    pub creator_id: i64,
    pub auditor_id: Option<i64>,
    pub old_content: String,
    pub new_content: String,
    pub status: AuditStatus,
    pub audit_result: Option<AuditResult>,
    pub reject_reason: Option<String>,
    pub audit_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub subject_activity_id: Option<i64>,
    pub subject_volunteer_id: Option<i64>,
    pub subject_org_id: Option<i64>,
}

impl AuditRecord {
    pub fn target(&self) -> LedgerResult<AuditTargetType> {
        self.target_type.parse()
    }

    pub fn is_pending(&self) -> bool {
        self.status == AuditStatus::Pending
    }
}
