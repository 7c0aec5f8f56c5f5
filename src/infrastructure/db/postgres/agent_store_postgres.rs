use crate::infrastructure::db::dto::AgentRow;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::agent_store::{AgentStore, AgentStoreError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use time::OffsetDateTime;

const AGENT_COLUMNS: &str = "\
    id, wallet_address, total_earned, claimed_total, passed_total, \
    completion_rate, reliability, created_at, updated_at";

fn map_err(e: sqlx::Error) -> AgentStoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AgentStoreError::Conflict
        }
        _ => AgentStoreError::StorageUnavailable,
    }
}

#[derive(Clone)]
pub struct AgentStorePostgres {
    db: std::sync::Arc<PostgresDatabase>,
}

impl AgentStorePostgres {
    /// Build a Postgres-backed agent store.
    pub fn new(db: std::sync::Arc<PostgresDatabase>) -> Self {
        Self { db }
    }

    async fn get_impl_conn(
        conn: &mut PgConnection,
        agent_id: uuid::Uuid,
    ) -> Result<Option<AgentRow>, AgentStoreError> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(row)
    }

    async fn insert_impl_conn(
        conn: &mut PgConnection,
        row: &AgentRow,
    ) -> Result<AgentRow, AgentStoreError> {
        let stored = sqlx::query_as::<_, AgentRow>(&format!(
            "INSERT INTO agents ({AGENT_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {AGENT_COLUMNS}"
        ))
        .bind(row.id)
        .bind(&row.wallet_address)
        .bind(row.total_earned)
        .bind(row.claimed_total)
        .bind(row.passed_total)
        .bind(row.completion_rate)
        .bind(row.reliability)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_err)?;

        Ok(stored)
    }

    async fn increment_claimed_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "UPDATE agents
            SET claimed_total = claimed_total + 1,
                completion_rate = passed_total::double precision
                    / (claimed_total + 1),
                updated_at = $2
            WHERE id = $1
            RETURNING {AGENT_COLUMNS}"
        ))
        .bind(agent_id)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_err)?;

        match row {
            Some(row) => Ok(row),
            None => Err(AgentStoreError::NotFound),
        }
    }

    async fn record_win_impl_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        earned: Decimal,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "UPDATE agents
            SET passed_total = passed_total + 1,
                total_earned = total_earned + $2,
                completion_rate = CASE
                    WHEN claimed_total = 0 THEN NULL
                    ELSE (passed_total + 1)::double precision / claimed_total
                END,
                updated_at = $3
            WHERE id = $1
            RETURNING {AGENT_COLUMNS}"
        ))
        .bind(agent_id)
        .bind(earned)
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_err)?;

        match row {
            Some(row) => Ok(row),
            None => Err(AgentStoreError::NotFound),
        }
    }

    async fn refresh_completion_rate_impl_conn(
        conn: &mut PgConnection,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "UPDATE agents
            SET completion_rate = CASE
                    WHEN claimed_total = 0 THEN NULL
                    ELSE passed_total::double precision / claimed_total
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING {AGENT_COLUMNS}"
        ))
        .bind(agent_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?;

        match row {
            Some(row) => Ok(row),
            None => Err(AgentStoreError::NotFound),
        }
    }
}

#[async_trait]
impl AgentStore for AgentStorePostgres {
    async fn get(&self, agent_id: uuid::Uuid) -> Result<Option<AgentRow>, AgentStoreError> {
        self.db
            .with_conn(move |conn| Box::pin(Self::get_impl_conn(conn, agent_id)))
            .await
    }

    async fn insert(&self, row: &AgentRow) -> Result<AgentRow, AgentStoreError> {
        let row = row.clone();
        self.db
            .with_conn(move |conn| {
                let row = row;
                Box::pin(async move { Self::insert_impl_conn(conn, &row).await })
            })
            .await
    }

    async fn increment_claimed_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        Self::increment_claimed_impl_tx(tx, agent_id, now).await
    }

    async fn record_win_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        earned: Decimal,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        Self::record_win_impl_tx(tx, agent_id, earned, now).await
    }

    async fn refresh_completion_rate(
        &self,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError> {
        self.db
            .with_conn(move |conn| {
                Box::pin(Self::refresh_completion_rate_impl_conn(conn, agent_id, now))
            })
            .await
    }
}
