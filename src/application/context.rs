use std::sync::Arc;

use crate::infrastructure::db::postgres::agent_store_postgres::AgentStorePostgres;
use crate::infrastructure::db::postgres::job_store_postgres::JobStorePostgres;
use crate::infrastructure::db::postgres::submission_store_postgres::SubmissionStorePostgres;
use crate::infrastructure::db::postgres::PostgresDatabase;
use crate::infrastructure::db::stores::agent_store::AgentStore;
use crate::infrastructure::db::stores::job_store::JobStore;
use crate::infrastructure::db::stores::submission_store::SubmissionStore;

/// The three persistence handles the lifecycle operations share.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub agents: Arc<dyn AgentStore>,
}

impl Stores {
    pub fn postgres(db: Arc<PostgresDatabase>) -> Self {
        Self {
            jobs: Arc::new(JobStorePostgres::new(db.clone())),
            submissions: Arc::new(SubmissionStorePostgres::new(db.clone())),
            agents: Arc::new(AgentStorePostgres::new(db)),
        }
    }
}
