// Use case: expire_due_jobs.

use crate::domain::services::task_lifecycle::LifecycleError;
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;
use crate::infrastructure::notify::{EventHub, StatusEvent};
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

const REASON_EXPIRED: &str = "task expired";

/// Expires funded jobs whose expiry instant has passed, both lazily (from
/// read paths) and in batches (from the sweeper loop). Expiring a job and
/// force-failing its open submissions commit in one transaction.
pub struct ExpireDueJobsUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub events: EventHub,
}

impl ExpireDueJobsUseCase {
    /// Expire one job if it is due. Returns `true` when this call performed
    /// the transition.
    pub async fn expire_job_if_due(&self, job_id: uuid::Uuid) -> Result<bool, LifecycleError> {
        let jobs = self.jobs.clone();
        let submissions = self.submissions.clone();
        let now = OffsetDateTime::now_utc();

        // Step 1: Conditional transition and submission force-fail, atomically.
        let expired: Option<JobRow> = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let Some(row) = jobs
                        .expire_if_due_tx(tx, job_id, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?
                    else {
                        return Ok(None);
                    };

                    submissions
                        .fail_open_for_job_tx(tx, job_id, REASON_EXPIRED, None, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    Ok(Some(row))
                })
            })
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        // Step 2: Announce the transition once it is durable.
        if expired.is_some() {
            counter!("jobs_expired_total").increment(1);
            info!(job_id = %job_id, "job expired");
            self.events.publish(StatusEvent::JobExpired { job_id });
        }

        Ok(expired.is_some())
    }

    /// One sweep pass: expire up to `limit` due jobs. Returns how many
    /// transitions this pass performed.
    pub async fn execute(&self, limit: u32) -> Result<u32, LifecycleError> {
        let due = self
            .jobs
            .list_due_expiry(OffsetDateTime::now_utc(), limit)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;

        let mut expired = 0u32;
        for row in due {
            if self.expire_job_if_due(row.id).await? {
                expired += 1;
            }
        }

        Ok(expired)
    }
}
