// Volunteer Ledger - work-hour accounting and audit workflow core
// This exposes the services and storage layer for embedding and testing

pub mod audit;
pub mod clock;
pub mod config;
pub mod database;
pub mod errors;
pub mod ledger;
pub mod membership;
pub mod models;
pub mod repository;
pub mod service;
pub mod signup;
pub mod telemetry;

// Re-export key types for easy access
pub use audit::{AuditService, JoinQueueRequest, PendingJoin};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use database::{DatabaseManager, RetryPolicy, TransactionRunner};
pub use errors::{ErrorKind, LedgerError, LedgerResult};
pub use ledger::{LedgerOutcome, LogFilter, RecalculateRequest, VoidRequest, WorkHourLedger};
pub use membership::MembershipService;
pub use models::{Actor, IdentityType, Page, PageRequest};
pub use service::ServiceContext;
pub use signup::{Attendance, CheckIn, SignupAccepted, SignupService, SupplementRequest};
pub use telemetry::{generate_correlation_id, init_telemetry};
