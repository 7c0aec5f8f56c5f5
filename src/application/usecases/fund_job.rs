// Use case: fund_job.

use crate::domain::entities::job::{Job, JobState};
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::JobId;
use crate::infrastructure::db::stores::job_store::{JobStore, JobStoreError};
use crate::infrastructure::notify::{EventHub, StatusEvent};
use crate::infrastructure::settlement::{SettlementError, SettlementGateway};
use metrics::counter;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Verifies an inbound deposit and moves the job `open -> funded`.
pub struct FundJobUseCase {
    pub jobs: Arc<dyn JobStore>,
    pub gateway: Arc<dyn SettlementGateway>,
    pub events: EventHub,
    /// The escrow address deposits must land on.
    pub destination_address: String,
}

impl FundJobUseCase {
    pub async fn execute(&self, job_id: JobId, deposit_tx_ref: &str) -> Result<Job, LifecycleError> {
        // Step 1: The job must exist and still be open.
        let job = self
            .jobs
            .get(job_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?
            .ok_or(LifecycleError::JobNotFound)?
            .into_job();
        if job.state != JobState::Open {
            return Err(LifecycleError::NotFundable);
        }

        // Step 2: Verify the transfer with the settlement gateway. The
        // gateway enforces destination, amount, and confirmation depth.
        let deposit = self
            .gateway
            .verify_inbound(
                deposit_tx_ref,
                &self.destination_address,
                job.price.as_decimal(),
            )
            .await
            .map_err(|e| match e {
                SettlementError::Rejected(reason) => LifecycleError::DepositInvalid(reason),
                other => LifecycleError::Settlement(other.to_string()),
            })?;

        if deposit.amount > job.price.as_decimal() {
            // Overpayment is absorbed; the refund path returns the full
            // deposited amount only on expiry or cancellation.
            warn!(
                job_id = %job_id,
                deposited = %deposit.amount,
                price = %job.price,
                "deposit exceeds job price, absorbing overpayment"
            );
        }

        // Step 3: Commit `open -> funded`, recording depositor and reference.
        // The unique index on the reference rejects a reuse across jobs.
        let funded = self
            .jobs
            .fund_if_open(
                job_id.0,
                deposit_tx_ref,
                &deposit.sender,
                deposit.amount,
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(|e| match e {
                JobStoreError::Conflict => LifecycleError::DuplicateDeposit,
                other => LifecycleError::Storage(format!("{other:?}")),
            })?
            .ok_or(LifecycleError::NotFundable)?;

        counter!("jobs_funded_total").increment(1);
        info!(job_id = %job_id, depositor = %deposit.sender, "job funded");
        self.events.publish(StatusEvent::JobFunded { job_id: job_id.0 });

        Ok(funded.into_job())
    }
}
