// Use case: create_job.

use crate::domain::entities::job::{Job, JobLimits};
use crate::domain::services::task_lifecycle::LifecycleError;
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::domain::value_objects::money::UsdcAmount;
use crate::domain::value_objects::timestamps::Timestamp;
use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::stores::agent_store::AgentStore;
use crate::infrastructure::db::stores::job_store::JobStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Platform-level defaults applied when the poster leaves a knob unset.
#[derive(Debug, Clone)]
pub struct CreateJobDefaults {
    pub min_price: UsdcAmount,
    pub fee_rate: Decimal,
    pub max_worker_attempts: u32,
    pub max_submissions: u32,
}

impl CreateJobDefaults {
    pub fn from_settings(
        settings: &crate::config::Lifecycle,
    ) -> Result<Self, rust_decimal::Error> {
        Ok(Self {
            min_price: UsdcAmount::new(settings.min_price_usdc.parse()?),
            fee_rate: settings.fee_rate.parse()?,
            max_worker_attempts: settings.default_max_worker_attempts,
            max_submissions: settings.default_max_submissions,
        })
    }
}

/// Validated creation request; unknown fields never reach this struct.
#[derive(Debug, Clone)]
pub struct CreateJobInput {
    pub poster_id: AgentId,
    pub title: String,
    pub description: String,
    pub rubric: Option<Vec<String>>,
    pub price: UsdcAmount,
    pub expires_at: Option<Timestamp>,
    pub max_worker_attempts: Option<u32>,
    pub max_submissions: Option<u32>,
    pub min_reputation: Option<f64>,
}

/// Creates a job in `open`, awaiting funding.
pub struct CreateJobUseCase {
    pub jobs: Arc<dyn JobStore>,
    pub agents: Arc<dyn AgentStore>,
    pub defaults: CreateJobDefaults,
}

impl CreateJobUseCase {
    pub async fn execute(&self, input: CreateJobInput) -> Result<Job, LifecycleError> {
        // Step 1: The poster must be a registered agent.
        let poster = self
            .agents
            .get(input.poster_id.0)
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;
        if poster.is_none() {
            return Err(LifecycleError::AgentNotFound);
        }

        // Step 2: Build the entity (creation invariants validate inside).
        let job = Job::new(
            JobId::new(),
            input.poster_id,
            input.title,
            input.description,
            input.rubric,
            input.price,
            self.defaults.min_price,
            self.defaults.fee_rate,
            input.expires_at,
            JobLimits {
                max_worker_attempts: input
                    .max_worker_attempts
                    .unwrap_or(self.defaults.max_worker_attempts),
                max_submissions: input
                    .max_submissions
                    .unwrap_or(self.defaults.max_submissions),
                min_reputation: input.min_reputation,
            },
        )?;

        // Step 3: Persist and return the stored job.
        let stored = self
            .jobs
            .insert(&JobRow::from_job(&job))
            .await
            .map_err(|e| LifecycleError::Storage(format!("{e:?}")))?;

        info!(job_id = %job.id, poster_id = %job.poster_id, "job created");
        Ok(stored.into_job())
    }
}

#[cfg(test)]
mod tests {
    use super::CreateJobDefaults;
    use crate::config::Lifecycle;
    use rust_decimal_macros::dec;

    #[test]
    fn given_settings_when_from_settings_should_parse_decimals() {
        let settings = Lifecycle {
            min_price_usdc: "0.50".to_string(),
            fee_rate: "0.05".to_string(),
            default_max_worker_attempts: 3,
            default_max_submissions: 50,
        };

        let defaults = CreateJobDefaults::from_settings(&settings).unwrap();

        assert_eq!(defaults.min_price.as_decimal(), dec!(0.50));
        assert_eq!(defaults.fee_rate, dec!(0.05));
        assert_eq!(defaults.max_worker_attempts, 3);
    }

    #[test]
    fn given_malformed_price_when_from_settings_should_error() {
        let settings = Lifecycle {
            min_price_usdc: "not-a-number".to_string(),
            fee_rate: "0.05".to_string(),
            default_max_worker_attempts: 3,
            default_max_submissions: 50,
        };

        assert!(CreateJobDefaults::from_settings(&settings).is_err());
    }
}
