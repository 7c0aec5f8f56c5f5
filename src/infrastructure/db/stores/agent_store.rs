use crate::infrastructure::db::database::DatabaseError;
use crate::infrastructure::db::dto::AgentRow;
use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStoreError {
    NotFound,
    Conflict,
    InvalidInput,
    StorageUnavailable,
}

impl From<DatabaseError> for AgentStoreError {
    fn from(_: DatabaseError) -> Self {
        AgentStoreError::StorageUnavailable
    }
}

/// Agent persistence. Completion statistics are always derived from claim
/// and pass counters inside the store, never written from caller-side math.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Fetch an agent by its ID. Returns `None` if it doesn't exist.
    async fn get(&self, agent_id: uuid::Uuid) -> Result<Option<AgentRow>, AgentStoreError>;
    /// Create an agent and return exactly what was stored.
    async fn insert(&self, row: &AgentRow) -> Result<AgentRow, AgentStoreError>;
    /// Bump the claim counter and refresh the derived completion rate.
    async fn increment_claimed_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError>;
    /// Record a winning submission: pass counter, earnings, completion rate.
    async fn record_win_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: uuid::Uuid,
        earned: Decimal,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError>;
    /// Recompute the completion rate from stored counters.
    async fn refresh_completion_rate(
        &self,
        agent_id: uuid::Uuid,
        now: OffsetDateTime,
    ) -> Result<AgentRow, AgentStoreError>;
}
