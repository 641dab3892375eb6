use thiserror::Error;

/// Coarse error classes callers branch on (reporting, reconciliation, retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PermissionDenied,
    StateConflict,
    LinkIntegrity,
    IdempotencyConflict,
    Transient,
    Internal,
}

/// Errors produced by the signup, audit and work-hour ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("duplicate signup for activity {activity_id} by volunteer {volunteer_id}")]
    DuplicateSignup { activity_id: i64, volunteer_id: i64 },

    #[error("membership already exists or is under review (org {org_id}, volunteer {volunteer_id})")]
    DuplicateMembership { org_id: i64, volunteer_id: i64 },

    #[error("audit record {record_id} already processed")]
    AlreadyProcessed { record_id: i64 },

    #[error("work-hour chain broken for signup {signup_id}: {reason}")]
    ChainBroken { signup_id: i64, reason: String },

    #[error("audit record {record_id} has an invalid snapshot: {reason}")]
    SnapshotInvalid { record_id: i64, reason: String },

    #[error("idempotency key {key:?} is already used by another request")]
    IdempotencyConflict { key: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str) -> Self {
        LedgerError::NotFound { entity }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        LedgerError::StateConflict(msg.into())
    }

    pub fn chain_broken(signup_id: i64, reason: impl Into<String>) -> Self {
        LedgerError::ChainBroken {
            signup_id,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            LedgerError::StateConflict(_)
            | LedgerError::DuplicateSignup { .. }
            | LedgerError::DuplicateMembership { .. }
            | LedgerError::AlreadyProcessed { .. } => ErrorKind::StateConflict,
            LedgerError::ChainBroken { .. } | LedgerError::SnapshotInvalid { .. } => {
                ErrorKind::LinkIntegrity
            }
            LedgerError::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
            LedgerError::Database(err) if crate::database::retry::is_transient(err) => {
                ErrorKind::Transient
            }
            LedgerError::Database(_)
            | LedgerError::Migration(_)
            | LedgerError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Deadlock and lock-wait failures that a fresh transaction may get past.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The insert collided with a unique index (idempotency key, signup version).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            LedgerError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        assert_eq!(LedgerError::validation("empty reason").kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::not_found("signup").kind(), ErrorKind::NotFound);
        assert_eq!(
            LedgerError::AlreadyProcessed { record_id: 7 }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            LedgerError::DuplicateSignup { activity_id: 1, volunteer_id: 2 }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(LedgerError::chain_broken(3, "version").kind(), ErrorKind::LinkIntegrity);
        assert_eq!(
            LedgerError::SnapshotInvalid { record_id: 1, reason: "missing org_id".into() }.kind(),
            ErrorKind::LinkIntegrity
        );
        assert_eq!(
            LedgerError::IdempotencyConflict { key: "void-1".into() }.kind(),
            ErrorKind::IdempotencyConflict
        );
    }

    #[test]
    fn test_plain_database_errors_are_not_transient() {
        let err = LedgerError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_transient());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_display_names_the_signup() {
        let err = LedgerError::chain_broken(42, "last log version mismatch");
        assert_eq!(
            err.to_string(),
            "work-hour chain broken for signup 42: last log version mismatch"
        );
    }
}
