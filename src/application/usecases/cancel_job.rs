// Use case: cancel_job.

use crate::application::usecases::refund_job::RefundJobUseCase;
use crate::domain::entities::job::Job;
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;
use crate::infrastructure::notify::{EventHub, StatusEvent};
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

const REASON_CANCELLED: &str = "task cancelled";

/// Cancels a job from `open`, or from `funded` while nothing is being
/// judged. Funded cancellations attempt an automatic refund; a failed
/// attempt stays recorded for a manual retry.
pub struct CancelJobUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub refunder: Arc<RefundJobUseCase>,
    pub events: EventHub,
}

impl CancelJobUseCase {
    pub async fn execute(&self, job_id: JobId, poster_id: AgentId) -> Result<Job, LifecycleError> {
        // Step 1: Only the poster may cancel.
        let job = self
            .jobs
            .get(job_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::JobNotFound)?
            .into_job();
        if job.poster_id != poster_id {
            return Err(LifecycleError::NotPoster);
        }

        // Step 2: Guarded transition plus submission cleanup, atomically.
        // The store-side guard re-checks the judging condition so a verdict
        // racing this call cannot slip through.
        let jobs = self.jobs.clone();
        let submissions = self.submissions.clone();
        let now = OffsetDateTime::now_utc();
        let cancelled: Option<JobRow> = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let Some(row) = jobs
                        .cancel_tx(tx, job_id.0, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?
                    else {
                        return Ok(None);
                    };

                    submissions
                        .fail_open_for_job_tx(tx, job_id.0, REASON_CANCELLED, None, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    Ok(Some(row))
                })
            })
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        let Some(cancelled) = cancelled else {
            return Err(LifecycleError::NotCancellable);
        };
        let cancelled = cancelled.into_job();

        counter!("jobs_cancelled_total").increment(1);
        info!(job_id = %job_id, "job cancelled");
        self.events
            .publish(StatusEvent::JobCancelled { job_id: job_id.0 });

        // Step 3: A funded job gets an automatic refund attempt; failure
        // downgrades to the manual refund path.
        if cancelled.deposit_tx_ref.is_some() {
            if let Err(err) = self.refunder.execute(job_id, poster_id).await {
                warn!(job_id = %job_id, error = %err, "automatic refund failed, left for manual retry");
            }
        }

        Ok(cancelled)
    }
}
