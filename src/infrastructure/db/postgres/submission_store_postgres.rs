use crate::infrastructure::db::dto::SubmissionRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::submission_store::{SubmissionStore, SubmissionStoreError};
use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;

const SUBMISSION_COLUMNS: &str = "\
    id, job_id, worker_id, content, status, score, verdict_reason, \
    round_trace, attempt, created_at, updated_at";

fn map_err(e: sqlx::Error) -> SubmissionStoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            SubmissionStoreError::Conflict
        }
        _ => SubmissionStoreError::StorageUnavailable,
    }
}

#[derive(Clone)]
pub struct SubmissionStorePostgres {
    db: std::sync::Arc<PostgresDatabase>,
}

impl SubmissionStorePostgres {
    /// Build a Postgres-backed submission store.
    pub fn new(db: std::sync::Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    async fn get_impl_conn(
        conn: &mut PgConnection,
        id: uuid::Uuid,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn insert_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        row: &SubmissionRow,
    ) -> Result<SubmissionRow, SubmissionStoreError> {
        let stored = sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submissions ({SUBMISSION_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(row.id)
        .bind(row.job_id)
        .bind(row.worker_id)
        .bind(&row.content)
        .bind(&row.status)
        .bind(row.score)
        .bind(&row.verdict_reason)
        .bind(&row.round_trace)
        .bind(row.attempt)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(stored)
    }

    async fn counts_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<(u32, u32), SubmissionStoreError> {
        let (worker_attempts, total): (i64, i64) = sqlx::query_as(
            "SELECT
                COUNT(*) FILTER (WHERE worker_id = $2),
                COUNT(*)
            FROM submissions
            WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(worker_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok((worker_attempts.max(0) as u32, total.max(0) as u32))
    }

    async fn mark_judging_impl_conn(
        conn: &mut PgConnection,
        id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions
            SET status = 'judging',
                updated_at = $2
            WHERE id = $1
              AND status = 'pending'
            RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn finalize_impl_conn(
        conn: &mut PgConnection,
        id: uuid::Uuid,
        status: &str,
        score: Option<i32>,
        reason: &str,
        round_trace: Option<&serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        // Guarded on 'judging' so a late result can never clobber a row the
        // timeout handler or a competing resolve already finalized.
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions
            SET status = $2,
                score = $3,
                verdict_reason = $4,
                round_trace = $5,
                updated_at = $6
            WHERE id = $1
              AND status = 'judging'
            RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(score)
        .bind(reason)
        .bind(round_trace)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn fail_open_for_job_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        reason: &str,
        exclude: Option<uuid::Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError> {
        let result = sqlx::query(
            "UPDATE submissions
            SET status = 'failed',
                verdict_reason = $2,
                updated_at = $3
            WHERE job_id = $1
              AND status IN ('pending', 'judging')
              AND ($4::uuid IS NULL OR id <> $4)",
        )
        .bind(job_id)
        .bind(reason)
        .bind(now)
        .bind(exclude)
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(result.rows_affected())
    }

    async fn fail_pending_for_worker_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError> {
        let result = sqlx::query(
            "UPDATE submissions
            SET status = 'failed',
                verdict_reason = $3,
                updated_at = $4
            WHERE job_id = $1
              AND worker_id = $2
              AND status = 'pending'",
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(reason)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(result.rows_affected())
    }

    async fn has_judging_for_worker_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<bool, SubmissionStoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM submissions
                WHERE job_id = $1 AND worker_id = $2 AND status = 'judging'
            )",
        )
        .bind(job_id)
        .bind(worker_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(exists)
    }

    async fn list_by_job_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
    ) -> Result<Vec<SubmissionRow>, SubmissionStoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE job_id = $1
            ORDER BY created_at ASC"
        ))
        .bind(job_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(rows)
    }
}

#[async_trait]
impl SubmissionStore for SubmissionStorePostgres {
    async fn get(&self, id: uuid::Uuid) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::get_impl_conn(conn, id)))
            .await
    }

    async fn insert_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        row: &SubmissionRow,
    ) -> Result<SubmissionRow, SubmissionStoreError> {
        Self::insert_impl_tx(tx, row).await
    }

    async fn counts_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<(u32, u32), SubmissionStoreError> {
        Self::counts_impl_tx(tx, job_id, worker_id).await
    }

    async fn mark_judging(
        &self,
        id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::mark_judging_impl_conn(conn, id, now)))
            .await
    }

    async fn finalize(
        &self,
        id: uuid::Uuid,
        status: &str,
        score: Option<i32>,
        reason: &str,
        round_trace: Option<&serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        let status = status.to_string();
        let reason = reason.to_string();
        let round_trace = round_trace.cloned();
        self.db
            .with_conn(move |conn| {
                Box::pin(async move {
                    Self::finalize_impl_conn(
                        conn,
                        id,
                        &status,
                        score,
                        &reason,
                        round_trace.as_ref(),
                        now,
                    )
                    .await
                })
            })
            .await
    }

    async fn finalize_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: uuid::Uuid,
        status: &str,
        score: Option<i32>,
        reason: &str,
        round_trace: Option<&serde_json::Value>,
        now: OffsetDateTime,
    ) -> Result<Option<SubmissionRow>, SubmissionStoreError> {
        Self::finalize_impl_conn(&mut *tx, id, status, score, reason, round_trace, now).await
    }

    async fn fail_open_for_job_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        reason: &str,
        exclude: Option<uuid::Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError> {
        Self::fail_open_for_job_impl_tx(tx, job_id, reason, exclude, now).await
    }

    async fn fail_pending_for_worker_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<u64, SubmissionStoreError> {
        Self::fail_pending_for_worker_impl_tx(tx, job_id, worker_id, reason, now).await
    }

    async fn has_judging_for_worker_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        worker_id: uuid::Uuid,
    ) -> Result<bool, SubmissionStoreError> {
        Self::has_judging_for_worker_impl_tx(tx, job_id, worker_id).await
    }

    async fn list_by_job(
        &self,
        job_id: uuid::Uuid,
    ) -> Result<Vec<SubmissionRow>, SubmissionStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::list_by_job_impl_conn(conn, job_id)))
            .await
    }
}
