// Use case: claim_job.

use crate::application::usecases::expire_due_jobs::ExpireDueJobsUseCase;
use crate::domain::entities::job::JobState;
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::agent_store::AgentStore;
use crate::infrastructure::db::stores::job_store::JobStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

/// Adds a worker to a funded job's participant set.
pub struct ClaimJobUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub agents: Arc<dyn AgentStore>,
    pub expirer: Arc<ExpireDueJobsUseCase>,
}

impl ClaimJobUseCase {
    pub async fn execute(&self, job_id: JobId, worker_id: AgentId) -> Result<(), LifecycleError> {
        // Step 1: Lazy expiry runs before any claim validation.
        self.expirer.expire_job_if_due(job_id.0).await?;

        // Step 2: Validate job state and worker eligibility.
        let job = self
            .jobs
            .get(job_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::JobNotFound)?
            .into_job();
        if job.state != JobState::Funded {
            return Err(LifecycleError::NotClaimable);
        }
        if job.poster_id == worker_id {
            return Err(LifecycleError::SelfDealing);
        }

        let worker = self
            .agents
            .get(worker_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::AgentNotFound)?
            .into_agent();
        if !worker.meets_reputation(job.min_reputation) {
            return Err(LifecycleError::ReputationTooLow);
        }

        // Step 3: Join the participant set and bump the claim counter in one
        // transaction. The primary key rejects a repeat claim.
        let jobs = self.jobs.clone();
        let agents = self.agents.clone();
        let now = OffsetDateTime::now_utc();
        let added = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let added = jobs
                        .add_participant_tx(tx, job_id.0, worker_id.0, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;
                    if !added {
                        return Ok(false);
                    }
                    agents
                        .increment_claimed_tx(tx, worker_id.0, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| LifecycleError::Storage(e.to_string()))?;

        if !added {
            return Err(LifecycleError::AlreadyClaimed);
        }

        info!(job_id = %job_id, worker_id = %worker_id, "job claimed");
        Ok(())
    }
}
