use crate::domain::value_objects::ids::{AgentId, JobId};
use crate::domain::value_objects::money::UsdcAmount;
use crate::domain::value_objects::timestamps::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 10_000;
pub const MAX_RUBRIC_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Open,
    Funded,
    Resolved,
    Expired,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Open => "open",
            JobState::Funded => "funded",
            JobState::Resolved => "resolved",
            JobState::Expired => "expired",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<JobState> {
        match value {
            "open" => Some(JobState::Open),
            "funded" => Some(JobState::Funded),
            "resolved" => Some(JobState::Resolved),
            "expired" => Some(JobState::Expired),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Sent => "sent",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<PayoutStatus> {
        match value {
            "pending" => Some(PayoutStatus::Pending),
            "sent" => Some(PayoutStatus::Sent),
            "failed" => Some(PayoutStatus::Failed),
            "skipped" => Some(PayoutStatus::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundStatus {
    Pending,
    Sent,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Sent => "sent",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<RefundStatus> {
        match value {
            "pending" => Some(RefundStatus::Pending),
            "sent" => Some(RefundStatus::Sent),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobValidationError {
    EmptyTitle,
    TitleTooLong,
    EmptyDescription,
    DescriptionTooLong,
    PriceBelowMinimum,
    RubricTooLarge,
    ExpiryInPast,
    InvalidFeeRate,
}

/// A unit of work with a bounty, completed by at most one winning worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub poster_id: AgentId,
    pub title: String,
    pub description: String,
    pub rubric: Option<Vec<String>>,
    pub price: UsdcAmount,
    pub fee_rate: Decimal,
    pub state: JobState,
    pub winner_id: Option<AgentId>,
    pub max_worker_attempts: u32,
    pub max_submissions: u32,
    pub min_reputation: Option<f64>,
    pub expires_at: Option<Timestamp>,
    pub deposit_tx_ref: Option<String>,
    pub depositor: Option<String>,
    pub deposit_amount: Option<UsdcAmount>,
    pub payout_tx_ref: Option<String>,
    pub payout_status: Option<PayoutStatus>,
    pub refund_tx_ref: Option<String>,
    pub refund_status: Option<RefundStatus>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Tunable knobs a poster may override at creation time.
#[derive(Debug, Clone)]
pub struct JobLimits {
    pub max_worker_attempts: u32,
    pub max_submissions: u32,
    pub min_reputation: Option<f64>,
}

impl Job {
    /// Create a new `Open` job, validating all creation-time invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        poster_id: AgentId,
        title: String,
        description: String,
        rubric: Option<Vec<String>>,
        price: UsdcAmount,
        min_price: UsdcAmount,
        fee_rate: Decimal,
        expires_at: Option<Timestamp>,
        limits: JobLimits,
    ) -> Result<Self, JobValidationError> {
        if title.trim().is_empty() {
            return Err(JobValidationError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(JobValidationError::TitleTooLong);
        }
        if description.trim().is_empty() {
            return Err(JobValidationError::EmptyDescription);
        }
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(JobValidationError::DescriptionTooLong);
        }
        if price < min_price || !price.is_positive() {
            return Err(JobValidationError::PriceBelowMinimum);
        }
        if let Some(items) = &rubric {
            if items.len() > MAX_RUBRIC_ITEMS {
                return Err(JobValidationError::RubricTooLarge);
            }
        }
        if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
            return Err(JobValidationError::InvalidFeeRate);
        }
        let now = Timestamp::now_utc();
        if let Some(expiry) = expires_at {
            if expiry.is_before(now) {
                return Err(JobValidationError::ExpiryInPast);
            }
        }

        Ok(Self {
            id,
            poster_id,
            title,
            description,
            rubric,
            price,
            fee_rate,
            state: JobState::Open,
            winner_id: None,
            max_worker_attempts: limits.max_worker_attempts,
            max_submissions: limits.max_submissions,
            min_reputation: limits.min_reputation,
            expires_at,
            deposit_tx_ref: None,
            depositor: None,
            deposit_amount: None,
            payout_tx_ref: None,
            payout_status: None,
            refund_tx_ref: None,
            refund_status: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `true` when the job is funded and its expiry instant has passed.
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        self.state == JobState::Funded
            && self
                .expires_at
                .map(|expiry| expiry.is_before(now) || expiry == now)
                .unwrap_or(false)
    }

    /// Net amount owed to the winner after the platform fee.
    pub fn winner_payout(&self) -> UsdcAmount {
        self.price.net_of_fee(self.fee_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    fn sample_job(price: UsdcAmount) -> Result<Job, JobValidationError> {
        Job::new(
            JobId::new(),
            AgentId::new(),
            "Summarize the weekly governance digest".to_string(),
            "Produce a 500-word summary of this week's proposals.".to_string(),
            None,
            price,
            UsdcAmount::new(dec!(0.50)),
            dec!(0.05),
            None,
            JobLimits {
                max_worker_attempts: 3,
                max_submissions: 50,
                min_reputation: None,
            },
        )
    }

    #[test]
    fn given_valid_inputs_when_new_should_create_open_job() {
        let job = sample_job(UsdcAmount::new(dec!(2.0))).unwrap();
        assert_eq!(job.state, JobState::Open);
        assert!(job.winner_id.is_none());
        assert!(job.deposit_tx_ref.is_none());
    }

    #[test]
    fn given_price_below_minimum_when_new_should_reject() {
        let err = sample_job(UsdcAmount::new(dec!(0.25))).unwrap_err();
        assert_eq!(err, JobValidationError::PriceBelowMinimum);
    }

    #[test]
    fn given_empty_title_when_new_should_reject() {
        let err = Job::new(
            JobId::new(),
            AgentId::new(),
            "  ".to_string(),
            "description".to_string(),
            None,
            UsdcAmount::new(dec!(2.0)),
            UsdcAmount::new(dec!(0.50)),
            dec!(0.05),
            None,
            JobLimits {
                max_worker_attempts: 3,
                max_submissions: 50,
                min_reputation: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, JobValidationError::EmptyTitle);
    }

    #[test]
    fn given_past_expiry_when_new_should_reject() {
        let past = Timestamp::from(OffsetDateTime::now_utc() - time::Duration::hours(1));
        let err = Job::new(
            JobId::new(),
            AgentId::new(),
            "title".to_string(),
            "description".to_string(),
            None,
            UsdcAmount::new(dec!(2.0)),
            UsdcAmount::new(dec!(0.50)),
            dec!(0.05),
            Some(past),
            JobLimits {
                max_worker_attempts: 3,
                max_submissions: 50,
                min_reputation: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, JobValidationError::ExpiryInPast);
    }

    #[test]
    fn given_funded_job_past_expiry_when_is_past_expiry_should_return_true() {
        let mut job = sample_job(UsdcAmount::new(dec!(2.0))).unwrap();
        job.state = JobState::Funded;
        job.expires_at = Some(Timestamp::from(
            OffsetDateTime::now_utc() - time::Duration::seconds(1),
        ));
        assert!(job.is_past_expiry(Timestamp::now_utc()));
    }

    #[test]
    fn given_open_job_past_expiry_when_is_past_expiry_should_return_false() {
        let mut job = sample_job(UsdcAmount::new(dec!(2.0))).unwrap();
        job.expires_at = Some(Timestamp::from(
            OffsetDateTime::now_utc() - time::Duration::seconds(1),
        ));
        assert!(!job.is_past_expiry(Timestamp::now_utc()));
    }

    #[test]
    fn given_job_when_winner_payout_should_deduct_fee() {
        let job = sample_job(UsdcAmount::new(dec!(2.0))).unwrap();
        assert_eq!(job.winner_payout().as_decimal(), dec!(1.9));
    }

    #[test]
    fn given_state_strings_when_parsed_should_round_trip() {
        for state in [
            JobState::Open,
            JobState::Funded,
            JobState::Resolved,
            JobState::Expired,
            JobState::Cancelled,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("unknown"), None);
    }
}
