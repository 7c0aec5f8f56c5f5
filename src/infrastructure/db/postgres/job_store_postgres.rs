use crate::infrastructure::db::dto::JobRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::job_store::{JobStore, JobStoreError};
use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;

const JOB_COLUMNS: &str = "\
    id, poster_id, title, description, rubric, price, fee_rate, status, \
    winner_id, max_worker_attempts, max_submissions, min_reputation, \
    expires_at, deposit_tx_ref, depositor, deposit_amount, payout_tx_ref, \
    payout_status, refund_tx_ref, refund_status, created_at, updated_at";

fn map_err(e: sqlx::Error) -> JobStoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            JobStoreError::Conflict
        }
        _ => JobStoreError::StorageUnavailable,
    }
}

#[derive(Clone)]
pub struct JobStorePostgres {
    db: std::sync::Arc<PostgresDatabase>,
}

impl JobStorePostgres {
    /// Build a Postgres-backed job store.
    pub fn new(db: std::sync::Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    async fn get_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
    ) -> Result<Option<JobRow>, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn insert_impl_conn(
        conn: &mut PgConnection,
        row: &JobRow,
    ) -> Result<JobRow, JobStoreError> {
        let stored = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(row.id)
        .bind(row.poster_id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.rubric)
        .bind(row.price)
        .bind(row.fee_rate)
        .bind(&row.status)
        .bind(row.winner_id)
        .bind(row.max_worker_attempts)
        .bind(row.max_submissions)
        .bind(row.min_reputation)
        .bind(row.expires_at)
        .bind(&row.deposit_tx_ref)
        .bind(&row.depositor)
        .bind(row.deposit_amount)
        .bind(&row.payout_tx_ref)
        .bind(&row.payout_status)
        .bind(&row.refund_tx_ref)
        .bind(&row.refund_status)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(stored)
    }

    async fn fund_if_open_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
        deposit_tx_ref: &str,
        depositor: &str,
        deposit_amount: rust_decimal::Decimal,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET status = 'funded',
                deposit_tx_ref = $2,
                depositor = $3,
                deposit_amount = $4,
                updated_at = $5
            WHERE id = $1
              AND status = 'open'
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(deposit_tx_ref)
        .bind(depositor)
        .bind(deposit_amount)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn resolve_if_funded_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        winner_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET status = 'resolved',
                winner_id = $2,
                updated_at = $3
            WHERE id = $1
              AND status = 'funded'
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(winner_id)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn cancel_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        // Cancellable while open, or while funded with nothing being judged.
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET status = 'cancelled',
                updated_at = $2
            WHERE id = $1
              AND (status = 'open'
                   OR (status = 'funded'
                       AND NOT EXISTS (
                           SELECT 1 FROM submissions
                           WHERE job_id = $1 AND status = 'judging'
                       )))
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn expire_if_due_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET status = 'expired',
                updated_at = $2
            WHERE id = $1
              AND status = 'funded'
              AND expires_at IS NOT NULL
              AND expires_at <= $2
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn list_due_expiry_impl_conn(
        conn: &mut PgConnection,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobStoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'funded'
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(rows)
    }

    async fn list_funded_impl_conn(
        conn: &mut PgConnection,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobStoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'funded'
            ORDER BY created_at ASC
            LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(rows)
    }

    async fn begin_refund_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        // Elects exactly one refund sender; a retried refund re-enters
        // through the 'failed' arm.
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET refund_status = 'pending',
                updated_at = $2
            WHERE id = $1
              AND status IN ('expired', 'cancelled')
              AND deposit_tx_ref IS NOT NULL
              AND (refund_status IS NULL OR refund_status = 'failed')
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn finish_refund_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET refund_status = $2,
                refund_tx_ref = COALESCE($3, refund_tx_ref),
                updated_at = $4
            WHERE id = $1
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(status)
        .bind(tx_ref)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        match row {
            Some(row) => Ok(row),
            None => Err(JobStoreError::NotFound),
        }
    }

    async fn set_payout_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
            SET payout_status = $2,
                payout_tx_ref = COALESCE($3, payout_tx_ref),
                updated_at = $4
            WHERE id = $1
              AND status = 'resolved'
            RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(status)
        .bind(tx_ref)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        match row {
            Some(row) => Ok(row),
            None => Err(JobStoreError::NotFound),
        }
    }

    async fn add_participant_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, JobStoreError> {
        let result = sqlx::query(
            "INSERT INTO job_participants (job_id, agent_id, claimed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id, agent_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(agent_id)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_participant_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError> {
        let result =
            sqlx::query("DELETE FROM job_participants WHERE job_id = $1 AND agent_id = $2")
                .bind(job_id)
                .bind(agent_id)
                .execute(&mut **tx)
                .await
                .map_err(map_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_participant_impl_conn(
        conn: &mut PgConnection,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM job_participants WHERE job_id = $1 AND agent_id = $2
            )",
        )
        .bind(job_id)
        .bind(agent_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(exists)
    }
}

#[async_trait]
impl JobStore for JobStorePostgres {
    async fn get(&self, job_id: uuid::Uuid) -> Result<Option<JobRow>, JobStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::get_impl_conn(conn, job_id)))
            .await
    }

    async fn get_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
    ) -> Result<Option<JobRow>, JobStoreError> {
        Self::get_impl_conn(&mut *tx, job_id).await
    }

    async fn insert(&self, row: &JobRow) -> Result<JobRow, JobStoreError> {
        let row = row.clone();
        self.db
            .with_conn(move |conn| {
                let row = row;
                Box::pin(async move { Self::insert_impl_conn(conn, &row).await })
            })
            .await
    }

    async fn fund_if_open(
        &self,
        job_id: uuid::Uuid,
        deposit_tx_ref: &str,
        depositor: &str,
        deposit_amount: rust_decimal::Decimal,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        let deposit_tx_ref = deposit_tx_ref.to_string();
        let depositor = depositor.to_string();
        self.db
            .with_conn(move |conn| {
                Box::pin(async move {
                    Self::fund_if_open_impl_conn(
                        conn,
                        job_id,
                        &deposit_tx_ref,
                        &depositor,
                        deposit_amount,
                        now,
                    )
                    .await
                })
            })
            .await
    }

    async fn resolve_if_funded_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        winner_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        Self::resolve_if_funded_impl_tx(tx, job_id, winner_id, now).await
    }

    async fn cancel_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        Self::cancel_impl_tx(tx, job_id, now).await
    }

    async fn expire_if_due_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        Self::expire_if_due_impl_tx(tx, job_id, now).await
    }

    async fn list_due_expiry(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<JobRow>, JobStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::list_due_expiry_impl_conn(conn, now, limit)))
            .await
    }

    async fn list_funded(&self, limit: u32) -> Result<Vec<JobRow>, JobStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::list_funded_impl_conn(conn, limit)))
            .await
    }

    async fn begin_refund(
        &self,
        job_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<JobRow>, JobStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::begin_refund_impl_conn(conn, job_id, now)))
            .await
    }

    async fn finish_refund(
        &self,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError> {
        let status = status.to_string();
        let tx_ref = tx_ref.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                Box::pin(async move {
                    Self::finish_refund_impl_conn(conn, job_id, &status, tx_ref.as_deref(), now)
                        .await
                })
            })
            .await
    }

    async fn set_payout(
        &self,
        job_id: uuid::Uuid,
        status: &str,
        tx_ref: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<JobRow, JobStoreError> {
        let status = status.to_string();
        let tx_ref = tx_ref.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                Box::pin(async move {
                    Self::set_payout_impl_conn(conn, job_id, &status, tx_ref.as_deref(), now).await
                })
            })
            .await
    }

    async fn add_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, JobStoreError> {
        Self::add_participant_impl_tx(tx, job_id, agent_id, now).await
    }

    async fn remove_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError> {
        Self::remove_participant_impl_tx(tx, job_id, agent_id).await
    }

    async fn is_participant(
        &self,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError> {
        self.db
            .with_conn(move |conn| {
                Box::pin(Self::is_participant_impl_conn(conn, job_id, agent_id))
            })
            .await
    }

    async fn is_participant_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> Result<bool, JobStoreError> {
        Self::is_participant_impl_conn(&mut *tx, job_id, agent_id).await
    }
}
