use sqlx::SqliteConnection;

use crate::errors::{LedgerError, LedgerResult};
use crate::models::{ActivitySignup, WorkHourLog, WorkHourOperation, WorkHourStatus};
use crate::repository::work_hours;

/// Check that the signup's settlement pointer agrees with the ledger.
///
/// Returns the entry referenced by `last_work_hour_log_id`, or `None` for a
/// signup that has never been settled (pending, version 0). Any mismatch is
/// reported as [`LedgerError::ChainBroken`] and never repaired.
pub async fn verify_chain(
    conn: &mut SqliteConnection,
    signup: &ActivitySignup,
) -> LedgerResult<Option<WorkHourLog>> {
    let Some(last_log_id) = signup.last_work_hour_log_id else {
        if signup.work_hour_status == WorkHourStatus::Pending && signup.work_hour_version == 0 {
            return Ok(None);
        }
        return Err(LedgerError::chain_broken(
            signup.id,
            format!(
                "no last log but status {:?} at version {}",
                signup.work_hour_status, signup.work_hour_version
            ),
        ));
    };

    let last_log = work_hours::find_log(&mut *conn, last_log_id)
        .await?
        .ok_or_else(|| {
            LedgerError::chain_broken(signup.id, format!("last log {last_log_id} does not exist"))
        })?;

    check_link(signup, &last_log)?;
    Ok(Some(last_log))
}

fn check_link(signup: &ActivitySignup, last_log: &WorkHourLog) -> LedgerResult<()> {
    if last_log.signup_id != signup.id
        || last_log.volunteer_id != signup.volunteer_id
        || last_log.activity_id != signup.activity_id
    {
        return Err(LedgerError::chain_broken(
            signup.id,
            format!("last log {} belongs to another signup", last_log.id),
        ));
    }

    if last_log.work_hour_version != signup.work_hour_version {
        return Err(LedgerError::chain_broken(
            signup.id,
            format!(
                "last log version {} != signup version {}",
                last_log.work_hour_version, signup.work_hour_version
            ),
        ));
    }

    let consistent = match signup.work_hour_status {
        WorkHourStatus::Granted => last_log.operation_type != WorkHourOperation::Void,
        WorkHourStatus::Voided => last_log.operation_type == WorkHourOperation::Void,
        WorkHourStatus::Pending => false,
    };
    if !consistent {
        return Err(LedgerError::chain_broken(
            signup.id,
            format!(
                "status {:?} disagrees with last operation {}",
                signup.work_hour_status,
                last_log.operation_type.as_str()
            ),
        ));
    }

    Ok(())
}
