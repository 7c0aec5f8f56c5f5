use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::SubmissionRow;
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStoreError {
    NotFound,
    Conflict,
    InvalidInput,
    StorageUnavailable,
}

impl From<DatabaseError> for SubmissionStoreError {
    fn from(_: DatabaseError) -> Self {
        SubmissionStoreError::StorageUnavailable
    }
}

/// Submission persistence. Terminal writes are guarded on the `judging`
/// status so a late evaluation result can never overwrite a finalized row.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Fetch a submission by its ID. Returns `None` if it doesn't exist.
    async fn get(&self, id: uuid::Uuid) -> Result<Option<SubmissionRow>, SubmissionStoreError>;
    /// Create a submission inside an existing transaction.
    async fn insert_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        row: &SubmissionRow,
    ) -> Result<SubmissionRow, SubmissionStoreError>;
    /// Count this worker's attempts and the job's total submissions.
    async fn counts_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<(u32, u32), SubmissionStoreError>;
    /// Move `pending -> judging`. `None` when the submission was already
    /// moved on (the CAS lost).
    async fn mark_judging(
        &self,
        id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError>;
    /// Move `judging -> passed|failed`, recording score, reason, and round
    /// trace. `None` when the submission is no longer `judging`.
    async fn finalize(
        &self,
        id: uuid::Uuid,
        status: &str,
        score: Option<i32>,
        reason: &str,
        round_trace: Option<&serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError>;
    /// Same as [`finalize`](Self::finalize), inside an existing transaction.
    async fn finalize_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: uuid::Uuid,
        status: &str,
        score: Option<i32>,
        reason: &str,
        round_trace: Option<&serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError>;
    /// Force every `pending`/`judging` submission of the job to `failed`,
    /// optionally sparing one (the winner). Returns the number failed.
    async fn fail_open_for_job_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        reason: &str,
        exclude: Option<uuid::Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError>;
    /// Force a single worker's `pending` submissions to `failed`.
    async fn fail_pending_for_worker_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError>;
    /// `true` while any of the worker's submissions for the job is judging.
    async fn has_judging_for_worker_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<bool, SubmissionStoreError>;
    /// List all submissions for a job, oldest first.
    async fn list_by_job(
        &self,
        job_id: uuid::Uuid,
    ) -> Result<Vec<SubmissionRow>, SubmissionStoreError>;
}
