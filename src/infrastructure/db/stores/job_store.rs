use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStoreError {
    NotFound,
    Conflict,
    InvalidInput,
    StorageUnavailable,
}

impl From<DatabaseError> for JobStoreError {
    fn from(_: DatabaseError) -> Self {
        JobStoreError::StorageUnavailable
    }
}

/// Job persistence. Every status mutation is a conditional update scoped to
/// the expected prior state; methods returning `Option<JobRow>` yield `None`
/// when the guard did not match (the CAS lost), never on storage failure.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by its ID. Returns `None` if it doesn't exist.
    async fn get(&self, job_id: uuid::Uuid) -> Result<Option<JobRow>, JobStoreError>;
    /// Fetch a job by ID inside an existing transaction.
    async fn get_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// Create a job and return exactly what was stored in the database.
    async fn insert(&self, row: &JobRow) -> Result<JobRow, JobStoreError>;
    /// Move `open -> funded`, recording the deposit reference, depositor,
    /// and deposited amount. `Err(Conflict)` signals the deposit reference
    /// is already in use.
    async fn fund_if_open(
        &self,
        job_id: uuid::Uuid,
        deposit_tx_ref: &str,
        depositor: &str,
        deposit_amount: rust_decimal::Decimal,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// Move `funded -> resolved` and set the winner. The single atomic
    /// transition that decides the resolve race.
    async fn resolve_if_funded_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        winner_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// Move to `cancelled` when the job is `open`, or `funded` with no
    /// submission currently judging.
    async fn cancel_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// Move `funded -> expired` when the expiry instant has passed.
    async fn expire_if_due_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// List funded jobs whose expiry instant has passed.
    async fn list_due_expiry(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobStoreError>;
    /// List funded jobs available for claiming, oldest first.
    async fn list_funded(&self, limit: u32) -> Result<Vec<JobRow>, JobStoreError>;
    /// Elect this caller as the refund sender: flips `refund_status` from
    /// NULL or `failed` to `pending` on a terminal refundable job.
    async fn begin_refund(
        &self,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError>;
    /// Record the outcome of a refund attempt.
    async fn finish_refund(
        &self,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError>;
    /// Record payout progress for a resolved job.
    async fn set_payout(
        &self,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError>;
    /// Add a worker to the participant set. Returns `false` when the worker
    /// is already a participant.
    async fn add_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, JobStoreError>;
    /// Remove a worker from the participant set. Returns `false` when the
    /// worker was not a participant.
    async fn remove_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError>;
    /// Check participant membership.
    async fn is_participant(
        &self,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError>;
    /// Check participant membership inside an existing transaction.
    async fn is_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError>;
}
