use crate::domain::entities::job::JobValidationError;
use crate::domain::entities::submission::{Submission, SubmissionValidationError};
use async_trait::async_trait;
use thiserror::Error;

/// Error taxonomy shared by every lifecycle operation. Validation and
/// state-conflict variants return synchronously to the caller; evaluation-time
/// failures never surface here (they finalize the submission instead).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("invalid input: {0:?}")]
    Validation(JobValidationError),
    #[error("invalid submission content: {0:?}")]
    SubmissionValidation(SubmissionValidationError),
    #[error("job is not in a fundable state")]
    NotFundable,
    #[error("deposit verification failed: {0}")]
    DepositInvalid(String),
    #[error("deposit reference already used by another job")]
    DuplicateDeposit,
    #[error("job is not claimable in its current state")]
    NotClaimable,
    #[error("worker has already claimed this job")]
    AlreadyClaimed,
    #[error("poster cannot work their own job")]
    SelfDealing,
    #[error("worker completion rate is below the job's reputation floor")]
    ReputationTooLow,
    #[error("worker is not a participant of this job")]
    NotParticipant,
    #[error("a submission by this worker is still being judged")]
    SubmissionInFlight,
    #[error("job is not accepting submissions in its current state")]
    NotSubmittable,
    #[error("worker attempt limit reached for this job")]
    RetryLimitExceeded,
    #[error("job-wide submission cap reached")]
    SubmissionCapExceeded,
    #[error("submission content exceeds the size bound")]
    ContentTooLarge,
    #[error("job cannot be cancelled in its current state")]
    NotCancellable,
    #[error("caller is not the poster of this job")]
    NotPoster,
    #[error("job is not in a refundable state")]
    NotRefundable,
    #[error("refund already sent or in progress")]
    AlreadyRefunded,
    #[error("job was already resolved by another submission")]
    AlreadyResolved,
    #[error("job not found")]
    JobNotFound,
    #[error("agent not found")]
    AgentNotFound,
    #[error("submission not found")]
    SubmissionNotFound,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("settlement gateway error: {0}")]
    Settlement(String),
}

impl From<JobValidationError> for LifecycleError {
    fn from(err: JobValidationError) -> Self {
        LifecycleError::Validation(err)
    }
}

impl From<SubmissionValidationError> for LifecycleError {
    fn from(err: SubmissionValidationError) -> Self {
        match err {
            SubmissionValidationError::ContentTooLarge => LifecycleError::ContentTooLarge,
            other => LifecycleError::SubmissionValidation(other),
        }
    }
}

/// Outcome of the resolve race for one passing submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// This submission's atomic transition committed; it is the winner.
    Won,
    /// Another submission resolved the job first; the passing verdict is
    /// discarded.
    Lost,
}

/// The resolve operation the evaluation path invokes for a passing
/// submission. The first caller whose conditional update commits wins;
/// every later caller gets `Lost`, regardless of score.
#[async_trait]
pub trait SubmissionResolver: Send + Sync {
    async fn resolve_passing(
        &self,
        submission: &Submission,
        score: u8,
        reason: &str,
        round_trace: &serde_json::Value,
    ) -> Result<ResolveOutcome, LifecycleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::submission::SubmissionValidationError;

    #[test]
    fn given_oversized_content_error_when_converted_should_map_to_content_too_large() {
        let err: LifecycleError = SubmissionValidationError::ContentTooLarge.into();
        assert_eq!(err, LifecycleError::ContentTooLarge);
    }

    #[test]
    fn given_empty_content_error_when_converted_should_stay_validation() {
        let err: LifecycleError = SubmissionValidationError::EmptyContent.into();
        assert_eq!(
            err,
            LifecycleError::SubmissionValidation(SubmissionValidationError::EmptyContent)
        );
    }
}
