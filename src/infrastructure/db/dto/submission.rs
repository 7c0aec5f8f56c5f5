use crate::domain::entities::submission::{Submission, SubmissionState};
use crate::domain::value_objects::ids::{AgentId, JobId, SubmissionId};
use crate::domain::value_objects::timestamps::Timestamp;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: uuid::Uuid,
    pub job_id: uuid::Uuid,
    pub worker_id: uuid::Uuid,
    pub content: String,
    pub status: String,
    pub score: Option<i32>,
    pub verdict_reason: Option<String>,
    pub round_trace: Option<serde_json::Value>,
    pub attempt: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SubmissionRow {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            id: submission.id.0,
            job_id: submission.job_id.0,
            worker_id: submission.worker_id.0,
            content: submission.content.clone(),
            status: submission.state.as_str().to_string(),
            score: submission.score.map(i32::from),
            verdict_reason: submission.verdict_reason.clone(),
            round_trace: submission.round_trace.clone(),
            attempt: submission.attempt as i32,
            created_at: submission.created_at.as_inner(),
            updated_at: submission.updated_at.as_inner(),
        }
    }

    pub fn into_submission(self) -> Submission {
        Submission {
            id: SubmissionId(self.id),
            job_id: JobId(self.job_id),
            worker_id: AgentId(self.worker_id),
            content: self.content,
            state: SubmissionState::parse(&self.status).unwrap_or(SubmissionState::Failed),
            score: self.score.and_then(|s| u8::try_from(s).ok()),
            verdict_reason: self.verdict_reason,
            round_trace: self.round_trace,
            attempt: self.attempt.max(0) as u32,
            created_at: Timestamp::from(self.created_at),
            updated_at: Timestamp::from(self.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SubmissionRow;
    use crate::domain::entities::submission::{Submission, SubmissionState};
    use crate::domain::value_objects::ids::{AgentId, JobId, SubmissionId};

    fn sample_submission() -> Submission {
        Submission::new(
            SubmissionId::new(),
            JobId::new(),
            AgentId::new(),
            "Here is the completed work.".to_string(),
            2,
        )
        .unwrap()
    }

    #[test]
    fn given_submission_when_from_submission_should_map_fields() {
        let mut submission = sample_submission();
        submission.state = SubmissionState::Passed;
        submission.score = Some(87);
        submission.verdict_reason = Some("meets all rubric items".to_string());

        let row = SubmissionRow::from_submission(&submission);

        assert_eq!(row.id, submission.id.0);
        assert_eq!(row.job_id, submission.job_id.0);
        assert_eq!(row.status, "passed");
        assert_eq!(row.score, Some(87));
        assert_eq!(row.attempt, 2);
    }

    #[test]
    fn given_row_when_into_submission_should_round_trip() {
        let submission = sample_submission();
        let row = SubmissionRow::from_submission(&submission);
        let back = row.into_submission();

        assert_eq!(back.id, submission.id);
        assert_eq!(back.state, SubmissionState::Pending);
        assert_eq!(back.attempt, 2);
        assert_eq!(back.content, submission.content);
    }

    #[test]
    fn given_unknown_status_when_into_submission_should_map_to_failed() {
        let submission = sample_submission();
        let mut row = SubmissionRow::from_submission(&submission);
        row.status = "unknown".to_string();

        assert_eq!(row.into_submission().state, SubmissionState::Failed);
    }

    #[test]
    fn given_out_of_range_score_when_into_submission_should_drop_score() {
        let submission = sample_submission();
        let mut row = SubmissionRow::from_submission(&submission);
        row.score = Some(1000);

        assert_eq!(row.into_submission().score, None);
    }
}
