#![allow(dead_code)]
//! Shared harness for the integration tests: a migrated SQLite file in a
//! temp dir, a manual clock, and seed helpers for the rows owned by the
//! surrounding CRUD surface.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use volunteer_ledger::config::DatabaseConfig;
use volunteer_ledger::models::{ActivitySignup, AuditRecord, OrgMember, Volunteer, WorkHourLog};
use volunteer_ledger::repository::{audits, memberships, signups, volunteers, work_hours};
use volunteer_ledger::{
    Actor, AuditService, DatabaseManager, LedgerConfig, ManualClock, MembershipService,
    ServiceContext, SignupService, WorkHourLedger,
};

pub const ORG_ACCOUNT: i64 = 500;
pub const OTHER_ORG_ACCOUNT: i64 = 501;
pub const VOLUNTEER_ACCOUNT: i64 = 100;
pub const OTHER_VOLUNTEER_ACCOUNT: i64 = 101;

/// 2025-03-01 09:00 UTC; every harness clock starts here.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
}

pub struct TestLedger {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub ctx: ServiceContext,
}

/// Ids of the rows seeded by [`TestLedger::with_activity`].
#[derive(Debug, Clone, Copy)]
pub struct Seeded {
    pub org_id: i64,
    pub volunteer_id: i64,
    pub activity_id: i64,
}

impl TestLedger {
    pub async fn new() -> Self {
        Self::with_config(LedgerConfig::default()).await
    }

    pub async fn with_config(mut config: LedgerConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("ledger.db");
        config.database = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 8,
            busy_timeout_ms: 5_000,
            auto_migrate: true,
        };

        let database = DatabaseManager::new(&config.database)
            .await
            .expect("open test database");
        let pool = database.pool().clone();
        let clock = Arc::new(ManualClock::new(start_time()));
        let ctx = ServiceContext::new(pool.clone(), &config, clock.clone());

        Self {
            _dir: dir,
            pool,
            clock,
            ctx,
        }
    }

    /// One organization, one volunteer and one recruiting activity owned
    /// by the organization.
    pub async fn with_activity(duration: f64, max_people: i64) -> (Self, Seeded) {
        let harness = Self::new().await;
        let org_id = harness.seed_org(ORG_ACCOUNT, "River Cleanup Society").await;
        let volunteer_id = harness.seed_volunteer(VOLUNTEER_ACCOUNT, "Lin Mei").await;
        let activity_id = harness.seed_activity(org_id, duration, max_people).await;
        (
            harness,
            Seeded {
                org_id,
                volunteer_id,
                activity_id,
            },
        )
    }

    pub fn signups(&self) -> SignupService {
        SignupService::new(self.ctx.clone())
    }

    pub fn audits(&self) -> AuditService {
        AuditService::new(self.ctx.clone())
    }

    pub fn ledger(&self) -> WorkHourLedger {
        WorkHourLedger::new(self.ctx.clone())
    }

    pub fn memberships(&self) -> MembershipService {
        MembershipService::new(self.ctx.clone())
    }

    pub fn volunteer_actor(&self) -> Actor {
        Actor::volunteer(VOLUNTEER_ACCOUNT)
    }

    pub fn org_actor(&self) -> Actor {
        Actor::organization(ORG_ACCOUNT)
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    pub async fn seed_org(&self, account_id: i64, name: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO organizations (account_id, org_name, created_at) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(account_id)
        .bind(name)
        .bind(start_time())
        .fetch_one(&self.pool)
        .await
        .expect("seed organization")
    }

    pub async fn seed_volunteer(&self, account_id: i64, real_name: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO volunteers (account_id, real_name, created_at) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(account_id)
        .bind(real_name)
        .bind(start_time())
        .fetch_one(&self.pool)
        .await
        .expect("seed volunteer")
    }

    pub async fn seed_activity(&self, org_id: i64, duration: f64, max_people: i64) -> i64 {
        sqlx::query_scalar(
            r#"
            INSERT INTO activities (org_id, title, duration, max_people, start_time, end_time, created_at)
            VALUES (?1, 'Riverbank litter pick', ?2, ?3, ?4, ?5, ?4)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(duration)
        .bind(max_people)
        .bind(start_time())
        .bind(start_time() + Duration::hours(8))
        .fetch_one(&self.pool)
        .await
        .expect("seed activity")
    }

    /// Materialized, approved signup holding one seat.
    pub async fn seed_signup(&self, activity_id: i64, volunteer_id: i64) -> i64 {
        let signup = signups::insert_signup(
            &self.pool,
            activity_id,
            volunteer_id,
            volunteer_ledger::models::SignupStatus::Success,
            start_time(),
        )
        .await
        .expect("seed signup");
        sqlx::query("UPDATE activities SET current_people = current_people + 1 WHERE id = ?1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .expect("take seat");
        signup.id
    }

    pub async fn set_activity_status(&self, activity_id: i64, status: &str) {
        sqlx::query("UPDATE activities SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .expect("update activity status");
    }

    pub async fn current_people(&self, activity_id: i64) -> i64 {
        sqlx::query_scalar("SELECT current_people FROM activities WHERE id = ?1")
            .bind(activity_id)
            .fetch_one(&self.pool)
            .await
            .expect("read current_people")
    }

    pub async fn volunteer(&self, volunteer_id: i64) -> Volunteer {
        volunteers::find_volunteer(&self.pool, volunteer_id)
            .await
            .expect("query volunteer")
            .expect("volunteer exists")
    }

    pub async fn signup(&self, signup_id: i64) -> ActivitySignup {
        signups::find_signup(&self.pool, signup_id)
            .await
            .expect("query signup")
            .expect("signup exists")
    }

    pub async fn signup_for(&self, activity_id: i64, volunteer_id: i64) -> Option<ActivitySignup> {
        signups::find_signup_by_pair(&self.pool, activity_id, volunteer_id)
            .await
            .expect("query signup")
    }

    pub async fn logs(&self, signup_id: i64) -> Vec<WorkHourLog> {
        work_hours::logs_for_signup(&self.pool, signup_id)
            .await
            .expect("query logs")
    }

    pub async fn record(&self, record_id: i64) -> AuditRecord {
        audits::find_audit_record(&self.pool, record_id)
            .await
            .expect("query audit record")
            .expect("audit record exists")
    }

    pub async fn membership(&self, org_id: i64, volunteer_id: i64) -> Option<OrgMember> {
        memberships::find_membership_by_pair(&self.pool, org_id, volunteer_id)
            .await
            .expect("query membership")
    }

    pub async fn audit_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_records")
            .fetch_one(&self.pool)
            .await
            .expect("count audit records")
    }

    /// Sum of the ledger deltas for a volunteer must equal the aggregate.
    pub async fn assert_aggregate_matches_ledger(&self, volunteer_id: i64) {
        let (hours, count): (f64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(hours_delta), 0.0), COALESCE(SUM(service_count_delta), 0) FROM work_hour_logs WHERE volunteer_id = ?1",
        )
        .bind(volunteer_id)
        .fetch_one(&self.pool)
        .await
        .expect("sum ledger");
        let volunteer = self.volunteer(volunteer_id).await;
        assert!(
            (volunteer.total_hours - hours).abs() < 1e-9,
            "total_hours {} != ledger sum {}",
            volunteer.total_hours,
            hours
        );
        assert_eq!(volunteer.service_count, count);
    }
}
