// Use case: sweeper_loop.

use crate::application::usecases::expire_due_jobs::ExpireDueJobsUseCase;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs the expiry sweep continuously until a shutdown signal is received.
pub struct SweeperLoopUseCase;

impl SweeperLoopUseCase {
    /// Run the sweep loop, polling at a fixed interval.
    pub async fn run(
        expirer: Arc<ExpireDueJobsUseCase>,
        poll_interval: Duration,
        max_batch: u32,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        // Step 1: Loop until the shutdown signal is triggered.
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Step 2: One sweep pass.
            match expirer.execute(max_batch).await {
                Ok(expired) if expired > 0 => {
                    info!(expired, "expiry sweep pass complete");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "expiry sweep pass failed");
                }
            }

            // Step 3: Sleep until the next poll or shutdown.
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}
