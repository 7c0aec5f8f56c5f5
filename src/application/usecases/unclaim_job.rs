// Use case: unclaim_job.

use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

const REASON_UNCLAIMED: &str = "worker unclaimed the task";

enum UnclaimTx {
    Removed,
    NotParticipant,
    InFlight,
}

/// Removes a worker from the participant set, failing their pending
/// submissions. Rejected while one of their submissions is being judged.
pub struct UnclaimJobUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

impl UnclaimJobUseCase {
    pub async fn execute(&self, job_id: JobId, worker_id: AgentId) -> Result<(), LifecycleError> {
        let jobs = self.jobs.clone();
        let submissions = self.submissions.clone();
        let now = OffsetDateTime::now_utc();

        // Step 1: Membership check, removal, and pending-submission cleanup
        // share one transaction.
        let outcome = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let judging = submissions
                        .has_judging_for_worker_tx(tx, job_id.0, worker_id.0)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;
                    if judging {
                        return Ok(UnclaimTx::InFlight);
                    }

                    let removed = jobs
                        .remove_participant_tx(tx, job_id.0, worker_id.0)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;
                    if !removed {
                        return Ok(UnclaimTx::NotParticipant);
                    }

                    submissions
                        .fail_pending_for_worker_tx(tx, job_id.0, worker_id.0, REASON_UNCLAIMED, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    Ok(UnclaimTx::Removed)
                })
            })
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        match outcome {
            UnclaimTx::Removed => {
                info!(job_id = %job_id, worker_id = %worker_id, "job unclaimed");
                Ok(())
            }
            UnclaimTx::NotParticipant => Err(LifecycleError::NotParticipant),
            UnclaimTx::InFlight => Err(LifecycleError::SubmissionInFlight),
        }
    }
}
