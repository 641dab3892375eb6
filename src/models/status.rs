//! Status vocabularies stored as snake_case TEXT columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SignupStatus {
    /// Waiting on an audit decision
    Pending,
    Success,
    Rejected,
    Canceled,
}

impl SignupStatus {
    /// Pending and successful signups block another signup for the same activity.
    pub fn is_active(self) -> bool {
        matches!(self, SignupStatus::Pending | SignupStatus::Success)
    }
}

/// Progress of one attendance leg (check-in or check-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkHourStatus {
    Pending,
    Granted,
    Voided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkHourOperation {
    Grant,
    Void,
    Regrant,
}

impl WorkHourOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkHourOperation::Grant => "grant",
            WorkHourOperation::Void => "void",
            WorkHourOperation::Regrant => "regrant",
        }
    }
}

impl FromStr for WorkHourOperation {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(WorkHourOperation::Grant),
            "void" => Ok(WorkHourOperation::Void),
            "regrant" => Ok(WorkHourOperation::Regrant),
            other => Err(LedgerError::validation(format!(
                "unknown work-hour operation: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Approved,
    Rejected,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Approved => "approved",
            AuditStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "approved" => Ok(AuditStatus::Approved),
            "rejected" => Ok(AuditStatus::Rejected),
            other => Err(LedgerError::validation(format!("unknown audit status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditResult {
    Pass,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

/// What an audit record proposes to change.
///
/// Stored as plain text on the record and parsed on resolution, so a row
/// written with an unknown value surfaces as a validation error instead of a
/// decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTargetType {
    /// Volunteer real-name verification
    Identity,
    /// Organization qualification verification
    Organization,
    Membership,
    Signup,
}

impl AuditTargetType {
    pub const ALL: [AuditTargetType; 4] = [
        AuditTargetType::Identity,
        AuditTargetType::Organization,
        AuditTargetType::Membership,
        AuditTargetType::Signup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditTargetType::Identity => "identity",
            AuditTargetType::Organization => "organization",
            AuditTargetType::Membership => "membership",
            AuditTargetType::Signup => "signup",
        }
    }
}

impl fmt::Display for AuditTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditTargetType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditTargetType::ALL
            .into_iter()
            .find(|target| target.as_str() == s)
            .ok_or_else(|| LedgerError::validation(format!("unknown audit target type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Active,
    Rejected,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Manager,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityStatus {
    Recruiting,
    Ongoing,
    Finished,
    Canceled,
}

/// Verification state of a volunteer or organization profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}
