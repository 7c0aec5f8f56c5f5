use bounty_run::application::usecases::expire_due_jobs::ExpireDueJobsUseCase;
use bounty_run::application::usecases::sweeper_loop::SweeperLoopUseCase;
use bounty_run::config;
use bounty_run::infrastructure::db::postgres::PostgresDatabase;
use bounty_run::infrastructure::notify::EventHub;
use bounty_run::application::context::Stores;
use std::sync::Arc;
use std::time::Duration;

// The lifecycle operations are invoked by whatever surface embeds this core;
// the daemon itself owns the one autonomous behavior: the expiry sweep.
#[tokio::main]
async fn main() {
    // Step 1: Load configuration and initialize logging.
    let settings = config::load().expect("load config");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Step 2: Connect to the database.
    let db = Arc::new(
        PostgresDatabase::connect(&settings.db.url)
            .await
            .expect("connect database"),
    );

    // Step 3: Build stores and the event hub.
    let stores = Stores::postgres(db.clone());
    let events = EventHub::default();

    // Step 4: Start the expiry sweeper with graceful shutdown.
    let expirer = Arc::new(ExpireDueJobsUseCase {
        db,
        jobs: stores.jobs.clone(),
        submissions: stores.submissions.clone(),
        events,
    });
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(SweeperLoopUseCase::run(
        expirer,
        Duration::from_millis(settings.sweeper.poll_interval_ms),
        settings.sweeper.max_batch,
        shutdown_rx,
    ));

    // Step 5: Run until interrupted.
    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
}
