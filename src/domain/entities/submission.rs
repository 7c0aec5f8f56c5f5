use crate::domain::value_objects::ids::{AgentId, JobId, SubmissionId};
use crate::domain::value_objects::timestamps::Timestamp;
use serde::{Deserialize, Serialize};

/// Upper bound on serialized submission content, in bytes.
pub const MAX_CONTENT_BYTES: usize = 51_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Pending,
    Judging,
    Passed,
    Failed,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::Judging => "judging",
            SubmissionState::Passed => "passed",
            SubmissionState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<SubmissionState> {
        match value {
            "pending" => Some(SubmissionState::Pending),
            "judging" => Some(SubmissionState::Judging),
            "passed" => Some(SubmissionState::Passed),
            "failed" => Some(SubmissionState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Passed | SubmissionState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionValidationError {
    EmptyContent,
    ContentTooLarge,
}

/// One worker's attempt at a job. Immutable once `Passed` or `Failed`.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub job_id: JobId,
    pub worker_id: AgentId,
    pub content: String,
    pub state: SubmissionState,
    pub score: Option<u8>,
    pub verdict_reason: Option<String>,
    pub round_trace: Option<serde_json::Value>,
    pub attempt: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Submission {
    /// Create a `Pending` submission, validating the content bound.
    pub fn new(
        id: SubmissionId,
        job_id: JobId,
        worker_id: AgentId,
        content: String,
        attempt: u32,
    ) -> Result<Self, SubmissionValidationError> {
        if content.trim().is_empty() {
            return Err(SubmissionValidationError::EmptyContent);
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(SubmissionValidationError::ContentTooLarge);
        }
        let now = Timestamp::now_utc();
        Ok(Self {
            id,
            job_id,
            worker_id,
            content,
            state: SubmissionState::Pending,
            score: None,
            verdict_reason: None,
            round_trace: None,
            attempt,
            created_at: now,
            updated_at: now,
        })
    }
}
