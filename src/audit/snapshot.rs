//! Typed payloads embedded in audit records.
//!
//! Every field is optional on the wire: a record written by an older client
//! or damaged in storage still deserializes, and the handler decides which
//! identifiers it cannot do without.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};
use crate::models::{AuditTargetType, MemberRole, MemberStatus, SignupStatus};
use crate::repository::audits::AuditSubject;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignupSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SignupStatus>,
}

/// Snapshot payload keyed by the record's target type.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Identity(IdentitySnapshot),
    Organization(OrganizationSnapshot),
    Membership(MembershipSnapshot),
    Signup(SignupSnapshot),
}

/// Positive identifier or a `SnapshotInvalid` naming the missing field.
pub fn require_id(record_id: i64, field: &str, value: Option<i64>) -> LedgerResult<i64> {
    match value {
        Some(id) if id > 0 => Ok(id),
        _ => Err(LedgerError::SnapshotInvalid {
            record_id,
            reason: format!("missing {field}"),
        }),
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(record_id: i64, content: &str) -> LedgerResult<T> {
    serde_json::from_str(content).map_err(|err| LedgerError::SnapshotInvalid {
        record_id,
        reason: err.to_string(),
    })
}

impl MembershipSnapshot {
    pub fn parse(record_id: i64, content: &str) -> LedgerResult<Self> {
        parse_payload(record_id, content)
    }

    /// `(org_id, volunteer_id)` of the proposed membership.
    pub fn pair(&self, record_id: i64) -> LedgerResult<(i64, i64)> {
        Ok((
            require_id(record_id, "org_id", self.org_id)?,
            require_id(record_id, "volunteer_id", self.volunteer_id)?,
        ))
    }
}

impl SignupSnapshot {
    pub fn parse(record_id: i64, content: &str) -> LedgerResult<Self> {
        parse_payload(record_id, content)
    }

    /// `(activity_id, volunteer_id)` of the proposed signup.
    pub fn pair(&self, record_id: i64) -> LedgerResult<(i64, i64)> {
        Ok((
            require_id(record_id, "activity_id", self.activity_id)?,
            require_id(record_id, "volunteer_id", self.volunteer_id)?,
        ))
    }
}

impl Snapshot {
    pub fn parse(target: AuditTargetType, record_id: i64, content: &str) -> LedgerResult<Self> {
        Ok(match target {
            AuditTargetType::Identity => Snapshot::Identity(parse_payload(record_id, content)?),
            AuditTargetType::Organization => Snapshot::Organization(parse_payload(record_id, content)?),
            AuditTargetType::Membership => Snapshot::Membership(parse_payload(record_id, content)?),
            AuditTargetType::Signup => Snapshot::Signup(parse_payload(record_id, content)?),
        })
    }

    pub fn target_type(&self) -> AuditTargetType {
        match self {
            Snapshot::Identity(_) => AuditTargetType::Identity,
            Snapshot::Organization(_) => AuditTargetType::Organization,
            Snapshot::Membership(_) => AuditTargetType::Membership,
            Snapshot::Signup(_) => AuditTargetType::Signup,
        }
    }

    /// Identifiers indexed alongside the record.
    pub fn subject(&self) -> AuditSubject {
        match self {
            Snapshot::Identity(s) => AuditSubject {
                volunteer_id: s.volunteer_id,
                ..AuditSubject::default()
            },
            Snapshot::Organization(s) => AuditSubject {
                org_id: s.org_id,
                ..AuditSubject::default()
            },
            Snapshot::Membership(s) => AuditSubject {
                org_id: s.org_id,
                volunteer_id: s.volunteer_id,
                ..AuditSubject::default()
            },
            Snapshot::Signup(s) => AuditSubject {
                activity_id: s.activity_id,
                volunteer_id: s.volunteer_id,
                ..AuditSubject::default()
            },
        }
    }

    pub fn to_json(&self) -> LedgerResult<String> {
        let json = match self {
            Snapshot::Identity(s) => serde_json::to_string(s)?,
            Snapshot::Organization(s) => serde_json::to_string(s)?,
            Snapshot::Membership(s) => serde_json::to_string(s)?,
            Snapshot::Signup(s) => serde_json::to_string(s)?,
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_snapshot_pair() {
        let snapshot = MembershipSnapshot::parse(1, r#"{"org_id": 3, "volunteer_id": 9, "status": "active"}"#)
            .unwrap();
        assert_eq!(snapshot.pair(1).unwrap(), (3, 9));
        assert_eq!(snapshot.status, Some(MemberStatus::Active));
    }

    #[test]
    fn test_missing_identifier_is_link_integrity_error() {
        let snapshot = SignupSnapshot::parse(4, r#"{"activity_id": 12}"#).unwrap();
        let err = snapshot.pair(4).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SnapshotInvalid { record_id: 4, ref reason } if reason == "missing volunteer_id"
        ));

        let zero = SignupSnapshot::parse(4, r#"{"activity_id": 12, "volunteer_id": 0}"#).unwrap();
        assert!(zero.pair(4).is_err());
    }

    #[test]
    fn test_malformed_json_is_snapshot_invalid() {
        let err = Snapshot::parse(AuditTargetType::Membership, 8, "{not json").unwrap_err();
        assert!(matches!(err, LedgerError::SnapshotInvalid { record_id: 8, .. }));
    }

    #[test]
    fn test_subject_follows_target() {
        let snapshot = Snapshot::Signup(SignupSnapshot {
            activity_id: Some(5),
            volunteer_id: Some(6),
            status: Some(SignupStatus::Pending),
        });
        assert_eq!(snapshot.target_type(), AuditTargetType::Signup);
        assert_eq!(
            snapshot.subject(),
            AuditSubject {
                activity_id: Some(5),
                volunteer_id: Some(6),
                org_id: None
            }
        );
        let json = snapshot.to_json().unwrap();
        assert_eq!(
            Snapshot::parse(AuditTargetType::Signup, 1, &json).unwrap(),
            snapshot
        );
    }
}
