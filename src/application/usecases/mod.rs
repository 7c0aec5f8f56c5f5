pub mod cancel_job;
pub mod claim_job;
pub mod create_job;
pub mod expire_due_jobs;
pub mod fund_job;
pub mod refund_job;
pub mod resolve_job;
pub mod submit_work;
pub mod sweeper_loop;
pub mod unclaim_job;
