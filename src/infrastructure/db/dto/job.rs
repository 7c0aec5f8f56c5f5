use crate::domain::entities::job::{Job, JobState, PayoutStatus, RefundStatus};
use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::domain::value_objects::money::UsdcAmount;
use crate::domain::value_objects::timestamps::Timestamp;
use rust_decimal::Decimal;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: uuid::Uuid,
    pub poster_id: uuid::Uuid,
    pub title: String,
    pub description: String,
    pub rubric: Option<serde_json::Value>,
    pub price: Decimal,
    pub fee_rate: Decimal,
    pub status: String,
    pub winner_id: Option<uuid::Uuid>,
    pub max_worker_attempts: i32,
    pub max_submissions: i32,
    pub min_reputation: Option<f64>,
    pub expires_at: Option<OffsetDateTime>,
    pub deposit_tx_ref: Option<String>,
    pub depositor: Option<String>,
    pub deposit_amount: Option<Decimal>,
    pub payout_tx_ref: Option<String>,
    pub payout_status: Option<String>,
    pub refund_tx_ref: Option<String>,
    pub refund_status: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl JobRow {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id.0,
            poster_id: job.poster_id.0,
            title: job.title.clone(),
            description: job.description.clone(),
            rubric: job
                .rubric
                .as_ref()
                .map(|items| serde_json::Value::from(items.clone())),
            price: job.price.as_decimal(),
            fee_rate: job.fee_rate,
            status: job.state.as_str().to_string(),
            winner_id: job.winner_id.map(|id| id.0),
            max_worker_attempts: job.max_worker_attempts as i32,
            max_submissions: job.max_submissions as i32,
            min_reputation: job.min_reputation,
            expires_at: job.expires_at.map(|t| t.as_inner()),
            deposit_tx_ref: job.deposit_tx_ref.clone(),
            depositor: job.depositor.clone(),
            deposit_amount: job.deposit_amount.map(|a| a.as_decimal()),
            payout_tx_ref: job.payout_tx_ref.clone(),
            payout_status: job.payout_status.map(|s| s.as_str().to_string()),
            refund_tx_ref: job.refund_tx_ref.clone(),
            refund_status: job.refund_status.map(|s| s.as_str().to_string()),
            created_at: job.created_at.as_inner(),
            updated_at: job.updated_at.as_inner(),
        }
    }

    pub fn into_job(self) -> Job {
        Job {
            id: JobId(self.id),
            poster_id: AgentId(self.poster_id),
            title: self.title,
            description: self.description,
            rubric: self.rubric.and_then(|value| match value {
                serde_json::Value::Array(items) => Some(
                    items
                        .into_iter()
                        .filter_map(|item| item.as_str().map(String::from))
                        .collect(),
                ),
                _ => None,
            }),
            price: UsdcAmount::new(self.price),
            fee_rate: self.fee_rate,
            state: JobState::parse(&self.status).unwrap_or(JobState::Cancelled),
            winner_id: self.winner_id.map(AgentId),
            max_worker_attempts: self.max_worker_attempts.max(0) as u32,
            max_submissions: self.max_submissions.max(0) as u32,
            min_reputation: self.min_reputation,
            expires_at: self.expires_at.map(Timestamp::from),
            deposit_tx_ref: self.deposit_tx_ref,
            depositor: self.depositor,
            deposit_amount: self.deposit_amount.map(UsdcAmount::new),
            payout_tx_ref: self.payout_tx_ref,
            payout_status: self.payout_status.as_deref().and_then(PayoutStatus::parse),
            refund_tx_ref: self.refund_tx_ref,
            refund_status: self.refund_status.as_deref().and_then(RefundStatus::parse),
            created_at: Timestamp::from(self.created_at),
            updated_at: Timestamp::from(self.updated_at),
        }
    }
}
