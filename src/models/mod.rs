//! Domain records and the acting identity.

pub mod entities;
pub mod status;

pub use entities::*;
pub use status::*;

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::errors::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    Volunteer,
    Organization,
}

/// Already-authenticated account performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: i64,
    pub identity: IdentityType,
}

impl Actor {
    pub fn volunteer(account_id: i64) -> Self {
        Self {
            account_id,
            identity: IdentityType::Volunteer,
        }
    }

    pub fn organization(account_id: i64) -> Self {
        Self {
            account_id,
            identity: IdentityType::Organization,
        }
    }

    pub fn is_organization(&self) -> bool {
        self.identity == IdentityType::Organization
    }

    pub fn require_organization(&self) -> LedgerResult<()> {
        if self.is_organization() {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied(format!(
                "account {} is not an organization",
                self.account_id
            )))
        }
    }

    pub fn require_volunteer(&self) -> LedgerResult<()> {
        match self.identity {
            IdentityType::Volunteer => Ok(()),
            IdentityType::Organization => Err(LedgerError::PermissionDenied(format!(
                "account {} is not a volunteer",
                self.account_id
            ))),
        }
    }
}

/// 1-based page selection; zero values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Clamp to the configured limits, returning `(page, page_size, offset)`.
    pub fn resolve(&self, limits: &LimitsConfig) -> (u32, u32, i64) {
        let page = self.page.max(1);
        let page_size = match self.page_size {
            0 => limits.default_page_size,
            n => n.min(limits.max_page_size),
        };
        let offset = i64::from(page - 1) * i64::from(page_size);
        (page, page_size, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_to_limits() {
        let limits = LimitsConfig::default();
        assert_eq!(PageRequest::default().resolve(&limits), (1, 50, 0));
        assert_eq!(PageRequest::new(3, 500).resolve(&limits), (3, 100, 200));
        assert_eq!(PageRequest::new(2, 10).resolve(&limits), (2, 10, 10));
    }

    #[test]
    fn test_actor_identity_checks() {
        assert!(Actor::organization(1).require_organization().is_ok());
        let err = Actor::volunteer(2).require_organization().unwrap_err();
        assert!(matches!(err, LedgerError::PermissionDenied(_)));
        assert!(Actor::organization(1).require_volunteer().is_err());
    }
}
