// Use case: resolve_job. Invoked by the evaluation path, never externally.

use crate::domain::entities::job::{Job, PayoutStatus};
use crate::domain::entities::submission::Submission;
use crate::domain::services::task_lifecycle::{
    LifecycleError, ResolveOutcome, SubmissionResolver,
};
use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::agent_store::AgentStore;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;
use crate::infrastructure::notify::{EventHub, StatusEvent};
use crate::infrastructure::settlement::SettlementGateway;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

const REASON_ALREADY_RESOLVED: &str = "task already resolved by another submission";
const WINNER_GONE: &str = "winner submission no longer judging";

enum ResolveTx {
    Won(Box<Job>),
    Lost,
}

/// Commits the single winning submission for a job. The conditional
/// `funded -> resolved` update is the whole race: the first submission whose
/// update commits wins, and every later passer is a no-op failure regardless
/// of score.
pub struct ResolveJobUseCase {
    pub db: Arc<PostgresDatabase>,
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub agents: Arc<dyn AgentStore>,
    pub gateway: Arc<dyn SettlementGateway>,
    pub events: EventHub,
}

impl ResolveJobUseCase {
    /// Send the winner their net payout, tracking progress in
    /// `payout_status` so a failed transfer can be retried without
    /// double-paying.
    async fn payout(&self, job: &Job) {
        let now = OffsetDateTime::now_utc();
        let Some(winner_id) = job.winner_id else {
            return;
        };

        let wallet = match self.agents.get(winner_id.0).await {
            Ok(Some(agent)) => agent.wallet_address,
            Ok(None) => None,
            Err(err) => {
                warn!(job_id = %job.id, error = ?err, "winner lookup failed before payout");
                return;
            }
        };

        let Some(wallet) = wallet else {
            // No wallet on file: the payout degrades to skipped.
            let _ = self
                .jobs
                .set_payout(job.id.0, PayoutStatus::Skipped.as_str(), None, now)
                .await;
            warn!(job_id = %job.id, winner_id = %winner_id, "winner has no wallet, payout skipped");
            return;
        };

        if self
            .jobs
            .set_payout(job.id.0, PayoutStatus::Pending.as_str(), None, now)
            .await
            .is_err()
        {
            warn!(job_id = %job.id, "could not mark payout pending");
            return;
        }

        let amount = job.winner_payout();
        match self.gateway.send_value(&wallet, amount.as_decimal()).await {
            Ok(tx_ref) => {
                let _ = self
                    .jobs
                    .set_payout(
                        job.id.0,
                        PayoutStatus::Sent.as_str(),
                        Some(&tx_ref),
                        OffsetDateTime::now_utc(),
                    )
                    .await;
                counter!("payouts_sent_total").increment(1);
                info!(job_id = %job.id, winner_id = %winner_id, amount = %amount, "payout sent");
            }
            Err(err) => {
                // Recorded as failed for an external retry path; never
                // silently retried here.
                let _ = self
                    .jobs
                    .set_payout(
                        job.id.0,
                        PayoutStatus::Failed.as_str(),
                        None,
                        OffsetDateTime::now_utc(),
                    )
                    .await;
                counter!("payouts_failed_total").increment(1);
                warn!(job_id = %job.id, error = %err, "payout failed");
            }
        }
    }
}

#[async_trait]
impl SubmissionResolver for ResolveJobUseCase {
    async fn resolve_passing(
        &self,
        submission: &Submission,
        score: u8,
        reason: &str,
        round_trace: &serde_json::Value,
    ) -> Result<ResolveOutcome, LifecycleError> {
        let jobs = self.jobs.clone();
        let submissions = self.submissions.clone();
        let agents = self.agents.clone();
        let job_id = submission.job_id.0;
        let submission_id = submission.id.0;
        let worker_id = submission.worker_id.0;
        let reason = reason.to_string();
        let round_trace = round_trace.clone();
        let now = OffsetDateTime::now_utc();

        // Step 1: The race. Job transition, winner finalize, loser force-fail,
        // and winner statistics commit or roll back as one unit.
        let tx_result = self
            .db
            .with_tx(|tx| {
                Box::pin(async move {
                    let Some(job_row) = jobs
                        .resolve_if_funded_tx(tx, job_id, worker_id, now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?
                    else {
                        return Ok(ResolveTx::Lost);
                    };

                    let finalized = submissions
                        .finalize_tx(
                            tx,
                            submission_id,
                            "passed",
                            Some(i32::from(score)),
                            &reason,
                            Some(&round_trace),
                            now,
                        )
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;
                    if finalized.is_none() {
                        // The submission was finalized out from under us
                        // (timeout handler); roll the job transition back.
                        return Err(DatabaseError::Query(WINNER_GONE.to_string()));
                    }

                    submissions
                        .fail_open_for_job_tx(
                            tx,
                            job_id,
                            REASON_ALREADY_RESOLVED,
                            Some(submission_id),
                            now,
                        )
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    let job = job_row.into_job();
                    agents
                        .record_win_tx(tx, worker_id, job.winner_payout().as_decimal(), now)
                        .await
                        .map_err(|e| DatabaseError::Query(format!("{e:?}")))?;

                    Ok(ResolveTx::Won(Box::new(job)))
                })
            })
            .await;

        match tx_result {
            Ok(ResolveTx::Won(job)) => {
                let job = *job;
                counter!("jobs_resolved_total").increment(1);
                info!(
                    job_id = %job.id,
                    winner_id = %submission.worker_id,
                    score,
                    "job resolved"
                );
                self.events.publish(StatusEvent::JobResolved {
                    job_id,
                    winner_id: worker_id,
                });
                self.events.publish(StatusEvent::SubmissionCompleted {
                    submission_id,
                    job_id,
                    worker_id,
                    passed: true,
                });

                // Step 2: Payout happens after the resolution is durable.
                self.payout(&job).await;
                Ok(ResolveOutcome::Won)
            }
            Ok(ResolveTx::Lost) => Ok(ResolveOutcome::Lost),
            Err(DatabaseError::Query(message)) if message == WINNER_GONE => {
                // Treated as a lost race: the orchestrator's late write-back
                // will be discarded by the judging guard.
                Ok(ResolveOutcome::Lost)
            }
            Err(err) => Err(LifecycleError::Storage(err.to_string())),
        }
    }
}
