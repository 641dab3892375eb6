use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use volunteer_ledger::models::{AuditStatus, WorkHourOperation};
use volunteer_ledger::{
    init_telemetry, Actor, AuditService, DatabaseManager, JoinQueueRequest, LedgerConfig,
    LedgerError, LogFilter, MembershipService, PageRequest, RecalculateRequest, ServiceContext,
    SignupService, SupplementRequest, VoidRequest, WorkHourLedger,
};

#[derive(Parser)]
#[command(name = "volunteer-ledger")]
#[command(about = "Volunteer work-hour ledger and audit workflow")]
#[command(long_about = "Records activity signups and attendance, settles volunteer work hours into an \
                       append-only ledger, and drives the review workflow for signups, memberships \
                       and verifications. Every command prints its result as JSON.")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "volunteer-ledger.toml")]
    config: PathBuf,

    /// Acting account id
    #[arg(long, global = true, default_value = "0", help = "Account performing the operation")]
    account: i64,

    /// Acting identity
    #[arg(long, global = true, value_enum, default_value = "volunteer")]
    identity: IdentityArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IdentityArg {
    Volunteer,
    Organization,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Print the effective configuration as TOML
    Config,
    /// Propose a signup for an activity
    Signup {
        #[arg(long)]
        activity: i64,
    },
    /// Cancel your signup for an activity
    Cancel {
        #[arg(long)]
        activity: i64,
    },
    /// Check in to an activity
    CheckIn {
        #[arg(long)]
        activity: i64,
    },
    /// Check out of an activity and settle the hours
    CheckOut {
        #[arg(long)]
        activity: i64,
    },
    /// Backfill attendance for a volunteer (organization only)
    Supplement {
        #[arg(long)]
        activity: i64,
        #[arg(long)]
        volunteer: i64,
        #[arg(long, help = "RFC 3339 check-in time; required if the volunteer never checked in")]
        check_in: Option<DateTime<Utc>>,
        #[arg(long, help = "RFC 3339 check-out time")]
        check_out: DateTime<Utc>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve a pending audit record
    Approve {
        #[arg(long)]
        record: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a pending audit record
    Reject {
        #[arg(long)]
        record: i64,
        #[arg(long)]
        reason: String,
    },
    /// Void the hours granted to a signup
    Void {
        #[arg(long)]
        signup: i64,
        #[arg(long)]
        reason: String,
        #[arg(long, help = "Client-chosen key; retries with the same key are served from the ledger")]
        key: String,
    },
    /// Recompute or regrant the hours of a signup
    Recalculate {
        #[arg(long)]
        signup: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        key: String,
        #[arg(long, help = "Explicit target hours; omitted means recompute from attendance")]
        hours: Option<f64>,
    },
    /// List ledger entries, newest first
    Logs {
        #[arg(long)]
        activity: Option<i64>,
        #[arg(long)]
        signup: Option<i64>,
        #[arg(long, help = "grant, void or regrant")]
        operation: Option<WorkHourOperation>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "0", help = "0 uses the configured default")]
        page_size: u32,
    },
    /// List membership-join proposals addressed to your organization
    PendingJoins {
        #[arg(long = "status", help = "pending, approved or rejected; repeatable")]
        statuses: Vec<AuditStatus>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "0")]
        page_size: u32,
    },
    /// Ask to join an organization
    Join {
        #[arg(long)]
        org: i64,
    },
    /// Ask to leave an organization
    Leave {
        #[arg(long)]
        membership: i64,
    },
    /// Submit real-name verification for your volunteer profile
    VerifyIdentity {
        #[arg(long)]
        real_name: String,
    },
    /// Submit qualification verification for your organization
    VerifyOrganization,
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    kind: String,
    message: &'a str,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    LedgerConfig::load_env_file()?;
    let config = LedgerConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_telemetry(&config.observability)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run(cli, config)) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<LedgerError>() {
            Some(ledger_err) => {
                let message = ledger_err.to_string();
                let report = ErrorReport {
                    kind: format!("{:?}", ledger_err.kind()),
                    message: &message,
                };
                eprintln!("{}", serde_json::to_string(&report)?);
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, config: LedgerConfig) -> Result<()> {
    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let database = DatabaseManager::new(&config.database).await?;
    let ctx = ServiceContext::with_system_clock(database.pool().clone(), &config);
    let actor = match cli.identity {
        IdentityArg::Volunteer => Actor::volunteer(cli.account),
        IdentityArg::Organization => Actor::organization(cli.account),
    };

    let result = dispatch(cli.command, &ctx, &actor, &database).await;
    database.shutdown().await;
    result
}

async fn dispatch(
    command: Commands,
    ctx: &ServiceContext,
    actor: &Actor,
    database: &DatabaseManager,
) -> Result<()> {
    let signups = SignupService::new(ctx.clone());
    let audits = AuditService::new(ctx.clone());
    let ledger = WorkHourLedger::new(ctx.clone());
    let memberships = MembershipService::new(ctx.clone());

    match command {
        Commands::Config => Ok(()),
        Commands::Migrate => {
            database.migrate().await?;
            print_json(&serde_json::json!({ "migrated": true }))
        }
        Commands::Signup { activity } => print_json(&signups.signup(actor, activity).await?),
        Commands::Cancel { activity } => {
            signups.cancel(actor, activity).await?;
            print_json(&serde_json::json!({ "canceled": true, "activity_id": activity }))
        }
        Commands::CheckIn { activity } => print_json(&signups.check_in(actor, activity).await?),
        Commands::CheckOut { activity } => print_json(&signups.check_out(actor, activity).await?),
        Commands::Supplement {
            activity,
            volunteer,
            check_in,
            check_out,
            reason,
        } => {
            let request = SupplementRequest {
                activity_id: activity,
                volunteer_id: volunteer,
                check_in_time: check_in,
                check_out_time: check_out,
                reason,
            };
            print_json(&signups.supplement_attendance(actor, request).await?)
        }
        Commands::Approve { record, reason } => {
            print_json(&audits.approve(actor, record, reason.as_deref()).await?)
        }
        Commands::Reject { record, reason } => print_json(&audits.reject(actor, record, &reason).await?),
        Commands::Void { signup, reason, key } => {
            let request = VoidRequest {
                signup_id: signup,
                reason,
                idempotency_key: key,
            };
            print_json(&ledger.void(actor, request).await?)
        }
        Commands::Recalculate {
            signup,
            reason,
            key,
            hours,
        } => {
            let request = RecalculateRequest {
                signup_id: signup,
                reason,
                idempotency_key: key,
                hours,
            };
            print_json(&ledger.recalculate(actor, request).await?)
        }
        Commands::Logs {
            activity,
            signup,
            operation,
            page,
            page_size,
        } => {
            let filter = LogFilter {
                activity_id: activity,
                signup_id: signup,
                operation_type: operation,
                page: PageRequest::new(page, page_size),
            };
            print_json(&ledger.list_logs(actor, filter).await?)
        }
        Commands::PendingJoins {
            statuses,
            keyword,
            page,
            page_size,
        } => {
            let request = JoinQueueRequest {
                statuses,
                keyword,
                page: PageRequest::new(page, page_size),
            };
            print_json(&audits.list_pending_membership_joins(actor, request).await?)
        }
        Commands::Join { org } => {
            let record_id = memberships.request_join(actor, org).await?;
            print_json(&serde_json::json!({ "record_id": record_id }))
        }
        Commands::Leave { membership } => {
            let record_id = memberships.request_leave(actor, membership).await?;
            print_json(&serde_json::json!({ "record_id": record_id }))
        }
        Commands::VerifyIdentity { real_name } => {
            let record_id = audits.submit_identity_verification(actor, &real_name).await?;
            print_json(&serde_json::json!({ "record_id": record_id }))
        }
        Commands::VerifyOrganization => {
            let record_id = audits.submit_organization_verification(actor).await?;
            print_json(&serde_json::json!({ "record_id": record_id }))
        }
    }
}
