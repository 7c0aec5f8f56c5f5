// Use case: refund_job.

use crate::domain::entities::job::{JobState, RefundStatus};
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::notify::{EventHub, StatusEvent};
use crate::infrastructure::settlement::SettlementGateway;
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Returns the full deposited amount to the recorded depositor of an
/// expired or cancelled job. Idempotent: the refund-status guard elects
/// exactly one sender, so a repeat call can never transfer twice.
pub struct RefundJobUseCase {
    pub jobs: Arc<dyn JobStore>,
    pub gateway: Arc<dyn SettlementGateway>,
    pub events: EventHub,
}

impl RefundJobUseCase {
    pub async fn execute(&self, job_id: JobId, caller: AgentId) -> Result<String, LifecycleError> {
        // Step 1: Validate caller and state.
        let job = self
            .jobs
            .get(job_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::JobNotFound)?
            .into_job();
        if job.poster_id != caller {
            return Err(LifecycleError::NotPoster);
        }
        if !matches!(job.state, JobState::Expired | JobState::Cancelled) {
            return Err(LifecycleError::NotRefundable);
        }

        // Step 2: Win the refund-sender election, or classify why not.
        let claimed = self
            .jobs
            .begin_refund(job_id.0, OffsetDateTime::now_utc())
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;
        let Some(claimed) = claimed else {
            // Lost the election or nothing to refund; re-read for a fresh
            // classification rather than trusting the earlier snapshot.
            let current = self
                .jobs
                .get(job_id.0)
                .await
                .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
                .ok_or(LifecycleError::JobNotFound)?
                .into_job();
            return match current.refund_status {
                Some(RefundStatus::Sent) | Some(RefundStatus::Pending) => {
                    Err(LifecycleError::AlreadyRefunded)
                }
                _ => Err(LifecycleError::NotRefundable),
            };
        };
        let job = claimed.into_job();

        let Some(depositor) = job.depositor.clone() else {
            // A funded job always records its depositor; treat the gap as
            // unrefundable rather than guessing a destination.
            let _ = self
                .jobs
                .finish_refund(
                    job_id.0,
                    RefundStatus::Failed.as_str(),
                    None,
                    OffsetDateTime::now_utc(),
                )
                .await;
            return Err(LifecycleError::NotRefundable);
        };

        // Step 3: Send the full deposited amount back.
        let amount = job.deposit_amount.unwrap_or(job.price);
        match self.gateway.send_value(&depositor, amount.as_decimal()).await {
            Ok(tx_ref) => {
                self.jobs
                    .finish_refund(
                        job_id.0,
                        RefundStatus::Sent.as_str(),
                        Some(&tx_ref),
                        OffsetDateTime::now_utc(),
                    )
                    .await
                    .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;
                counter!("refunds_sent_total").increment(1);
                info!(job_id = %job_id, depositor = %depositor, amount = %amount, "refund sent");
                self.events
                    .publish(StatusEvent::JobRefunded { job_id: job_id.0 });
                Ok(tx_ref)
            }
            Err(err) => {
                // Recorded as failed and left retriable.
                let _ = self
                    .jobs
                    .finish_refund(
                        job_id.0,
                        RefundStatus::Failed.as_str(),
                        None,
                        OffsetDateTime::now_utc(),
                    )
                    .await;
                counter!("refunds_failed_total").increment(1);
                warn!(job_id = %job_id, error = %err, "refund failed");
                Err(LifecycleError::Settlement(err.to_string()))
            }
        }
    }
}
