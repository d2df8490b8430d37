//! Ingest consumer - Kafka topic to PostgreSQL
//!
//! Environment variables:
//! - DATABASE_URL, or DB_HOST / DB_PORT / DB_USER / DB_PASSWORD / DB_NAME / DB_SSL_MODE
//! - KAFKA_BROKERS: comma separated broker list (default: "localhost:9092")
//! - KAFKA_TOPIC: topic to consume (default: "events")
//! - KAFKA_GROUP_ID: consumer group (default: "event-ingest")
//! - APP_WORKER_COUNT: number of workers (default: 4)
//! - APP_MAX_RETRIES / APP_RETRY_DELAY_MS: transient failure retry policy
//! - LOG_LEVEL / LOG_FORMAT: logging (RUST_LOG overrides LOG_LEVEL)

use anyhow::Context;
use ingest_service::config::Config;
use ingest_service::kafka::{KafkaReader, MessageSource};
use ingest_service::repository::PgEventRepository;
use ingest_service::services::{dispatch_channel, EventProcessor, WorkerPool};
use ingest_service::{logging, shutdown, MIGRATOR};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init_tracing(&config.logging);

    info!(
        environment = %config.app.environment,
        workers = config.app.worker_count,
        "Starting ingest consumer"
    );
    config.database.log_config();

    let pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    db_pool::run_migrations(&pool, &MIGRATOR)
        .await
        .context("Failed to run migrations")?;
    info!("Database connection established");

    let reader = Arc::new(KafkaReader::new(&config.kafka).context("Failed to create Kafka reader")?);
    let (sender, receiver) = dispatch_channel();
    let source = Arc::new(MessageSource::new(
        reader,
        sender,
        Duration::from_millis(config.kafka.fetch_error_backoff_ms),
    ));

    let repository = Arc::new(PgEventRepository::new(pool.clone()));
    let processor = Arc::new(
        EventProcessor::new(repository, source.clone()).with_retry(config.app.retry_config()),
    );
    let workers = WorkerPool::new(receiver, processor, config.app.worker_count)
        .context("Failed to create worker pool")?;

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::spawn_signal_listener(shutdown_tx.clone());

    workers.start(shutdown_rx.clone());

    let source_task = tokio::spawn({
        let source = source.clone();
        let shutdown_rx = shutdown_rx.clone();
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if let Err(e) = source.start_consuming(shutdown_rx).await {
                error!(error = %e, "Message source failed");
            }
            // Nothing feeds the workers any more.
            let _ = shutdown_tx.send(true);
        }
    });

    info!(
        topic = %config.kafka.topic,
        brokers = %config.kafka.bootstrap_servers(),
        workers = workers.worker_count(),
        "Consumer is running. Press Ctrl+C to stop."
    );

    let mut wait_rx = shutdown_rx.clone();
    shutdown::signalled(&mut wait_rx).await;

    let grace = config.app.shutdown_grace();
    info!(timeout_ms = grace.as_millis() as u64, "Waiting for in-flight messages");

    match resilience::with_timeout(grace, workers.stop()).await {
        Ok(()) => info!("All workers finished processing"),
        Err(_) => warn!("Shutdown timeout reached, forcing shutdown"),
    }
    workers.force_close().await;

    if let Err(e) = source_task.await {
        error!(error = %e, "Message source task panicked");
    }

    let close_result = source.close().await;
    pool.close().await;

    close_result.context("Failed to close Kafka reader")?;
    info!("Application shutdown completed");
    Ok(())
}
