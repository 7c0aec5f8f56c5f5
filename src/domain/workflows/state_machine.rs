use crate::domain::entities::job::JobState;
use crate::domain::entities::submission::SubmissionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    Forbidden,
}

pub struct JobStateMachine;

impl JobStateMachine {
    /// Job transitions are monotonic: `open -> funded -> resolved`, with
    /// `expired`/`cancelled` as the alternative terminals. Submission
    /// retry loops live on the submission machine, not here.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        matches!(
            (from, to),
            (JobState::Open, JobState::Funded)
                | (JobState::Open, JobState::Cancelled)
                | (JobState::Funded, JobState::Resolved)
                | (JobState::Funded, JobState::Expired)
                | (JobState::Funded, JobState::Cancelled)
        )
    }

    pub fn transition(from: JobState, to: JobState) -> Result<JobState, TransitionError> {
        if Self::can_transition(from, to) {
            return Ok(to);
        }

        Err(TransitionError::Forbidden)
    }
}

pub struct SubmissionStateMachine;

impl SubmissionStateMachine {
    /// Submissions only move forward: `pending -> judging -> passed|failed`.
    /// `pending -> failed` covers force-fails during unclaim/expire/cancel.
    pub fn can_transition(from: SubmissionState, to: SubmissionState) -> bool {
        matches!(
            (from, to),
            (SubmissionState::Pending, SubmissionState::Judging)
                | (SubmissionState::Pending, SubmissionState::Failed)
                | (SubmissionState::Judging, SubmissionState::Passed)
                | (SubmissionState::Judging, SubmissionState::Failed)
        )
    }

    pub fn transition(
        from: SubmissionState,
        to: SubmissionState,
    ) -> Result<SubmissionState, TransitionError> {
        if Self::can_transition(from, to) {
            return Ok(to);
        }

        Err(TransitionError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_allowed_job_transitions_when_checked_should_be_allowed() {
        let cases = [
            (JobState::Open, JobState::Funded),
            (JobState::Open, JobState::Cancelled),
            (JobState::Funded, JobState::Resolved),
            (JobState::Funded, JobState::Expired),
            (JobState::Funded, JobState::Cancelled),
        ];

        for (from, to) in cases {
            assert!(JobStateMachine::can_transition(from, to));
            assert_eq!(JobStateMachine::transition(from, to), Ok(to));
        }
    }

    #[test]
    fn given_terminal_job_states_when_transitioning_should_be_forbidden() {
        let states = [
            JobState::Open,
            JobState::Funded,
            JobState::Resolved,
            JobState::Expired,
            JobState::Cancelled,
        ];

        for to in states {
            assert_eq!(
                JobStateMachine::transition(JobState::Resolved, to),
                Err(TransitionError::Forbidden)
            );
            assert_eq!(
                JobStateMachine::transition(JobState::Expired, to),
                Err(TransitionError::Forbidden)
            );
            assert_eq!(
                JobStateMachine::transition(JobState::Cancelled, to),
                Err(TransitionError::Forbidden)
            );
        }
    }

    #[test]
    fn given_backward_job_transition_when_checked_should_be_forbidden() {
        assert_eq!(
            JobStateMachine::transition(JobState::Funded, JobState::Open),
            Err(TransitionError::Forbidden)
        );
        assert_eq!(
            JobStateMachine::transition(JobState::Open, JobState::Resolved),
            Err(TransitionError::Forbidden)
        );
    }

    #[test]
    fn given_allowed_submission_transitions_when_checked_should_be_allowed() {
        let cases = [
            (SubmissionState::Pending, SubmissionState::Judging),
            (SubmissionState::Pending, SubmissionState::Failed),
            (SubmissionState::Judging, SubmissionState::Passed),
            (SubmissionState::Judging, SubmissionState::Failed),
        ];

        for (from, to) in cases {
            assert!(SubmissionStateMachine::can_transition(from, to));
            assert_eq!(SubmissionStateMachine::transition(from, to), Ok(to));
        }
    }

    #[test]
    fn given_terminal_submission_states_when_transitioning_should_be_forbidden() {
        let states = [
            SubmissionState::Pending,
            SubmissionState::Judging,
            SubmissionState::Passed,
            SubmissionState::Failed,
        ];

        for to in states {
            assert_eq!(
                SubmissionStateMachine::transition(SubmissionState::Passed, to),
                Err(TransitionError::Forbidden)
            );
            assert_eq!(
                SubmissionStateMachine::transition(SubmissionState::Failed, to),
                Err(TransitionError::Forbidden)
            );
        }
    }

    #[test]
    fn given_pending_to_passed_when_checked_should_be_forbidden() {
        assert_eq!(
            SubmissionStateMachine::transition(SubmissionState::Pending, SubmissionState::Passed),
            Err(TransitionError::Forbidden)
        );
    }
}
