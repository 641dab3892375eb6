//! SQL access for the ledger and audit workflow.
//!
//! Every function takes any [`sqlx::SqliteExecutor`], so the same query runs
//! against the pool or a live transaction handle (`&mut *conn`).
//!
//! `lock_*` functions are the "read with exclusive lock" form: a no-op
//! `UPDATE ... RETURNING *` that takes the database write lock and holds it
//! until the surrounding transaction ends. Transactions that lock anything
//! lock first, so they never need to upgrade a read lock.

pub mod activities;
pub mod audits;
pub mod memberships;
pub mod organizations;
pub mod signups;
pub mod volunteers;
pub mod work_hours;
