// Use case: submit_work.

use crate::application::usecases::expire_due_jobs::ExpireDueJobsUseCase;
use crate::domain::entities::job::JobState;
use crate::domain::entities::submission::Submission;
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId, SubmissionId};
use crate::domain::workflows::attempt_policy::{AttemptPolicy, AttemptRejection};
use crate::evaluation::orchestrator::EvaluationOrchestrator;
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::SubmissionRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

enum SubmitTx {
    Admitted(SubmissionRow),
    Rejected(AttemptRejection),
}

/// Accepts a worker's submission, dispatches evaluation, and returns
/// immediately. The returned ID is accepted-for-processing, not a verdict.
pub struct SubmitWorkUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub expirer: Arc<ExpireDueJobsUseCase>,
    pub orchestrator: Arc<EvaluationOrchestrator>,
}

impl SubmitWorkUseCase {
    pub async fn execute(
        &self,
        job_id: JobId,
        worker_id: AgentId,
        content: String,
    ) -> Result<SubmissionId, LifecycleError> {
        // Step 1: Lazy expiry runs before any submit validation.
        self.expirer.expire_job_if_due(job_id.0).await?;

        // Step 2: Validate job state and participation.
        let job = self
            .jobs
            .get(job_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::JobNotFound)?
            .into_job();
        if job.state != JobState::Funded {
            return Err(LifecycleError::NotSubmittable);
        }
        let participant = self
            .jobs
            .is_participant(job_id.0, worker_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;
        if !participant {
            return Err(LifecycleError::NotParticipant);
        }

        // Step 3: Content bound validates in the entity constructor; no row
        // is created for oversized content.
        let submission = Submission::new(SubmissionId::new(), job_id, worker_id, content, 1)?;

        // Step 4: Count attempts and insert the pending row atomically, so
        // two racing submits cannot both squeeze under a cap.
        let policy = AttemptPolicy {
            max_worker_attempts: job.max_worker_attempts,
            max_submissions: job.max_submissions,
        };
        let submissions = self.submissions.clone();
        let mut row = SubmissionRow::from_submission(&submission);
        let outcome = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let (worker_attempts, total) = submissions
                        .counts_tx(tx, job_id.0, worker_id.0)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    if let Err(rejection) = policy.admit(worker_attempts, total) {
                        return Ok(SubmitTx::Rejected(rejection));
                    }

                    row.attempt = worker_attempts as i32 + 1;
                    let stored = submissions
                        .insert_tx(tx, &row)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    Ok(SubmitTx::Admitted(stored))
                })
            })
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        let stored = match outcome {
            SubmitTx::Admitted(stored) => stored,
            SubmitTx::Rejected(AttemptRejection::WorkerLimitReached) => {
                return Err(LifecycleError::RetryLimitExceeded)
            }
            SubmitTx::Rejected(AttemptRejection::JobCapReached) => {
                return Err(LifecycleError::SubmissionCapExceeded)
            }
        };

        // Step 5: Flip to judging and hand off to the evaluation unit. The
        // submit caller never waits on the verdict.
        let marked = self
            .submissions
            .mark_judging(stored.id, OffsetDateTime::now_utc())
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;
        if marked.is_some() {
            counter!("submissions_received_total").increment(1);
            info!(
                submission_id = %stored.id,
                job_id = %job_id,
                worker_id = %worker_id,
                attempt = stored.attempt,
                "submission accepted, evaluation dispatched"
            );
            self.orchestrator.dispatch(stored.id);
        } else {
            // Something terminal happened between insert and dispatch
            // (expiry sweep, cancellation); the row is already failed.
            warn!(submission_id = %stored.id, "submission finalized before dispatch");
        }

        Ok(SubmissionId(stored.id))
    }
}
