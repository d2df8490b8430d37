//! Sample event producer
//!
//! Publishes random events to the ingest topic for local testing.
//!
//! Usage: `event-producer [count]` (default count: `PRODUCER_EVENT_COUNT` or 100)

use anyhow::Context;
use db_pool::env_utils::parse_env_or;
use ingest_service::config::{KafkaConfig, LoggingConfig};
use ingest_service::kafka::EventProducer;
use ingest_service::{logging, shutdown};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let logging_config = LoggingConfig::from_env().context("Failed to load logging config")?;
    logging::init_tracing(&logging_config);

    let kafka = KafkaConfig::from_env().context("Failed to load Kafka config")?;
    let count = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<usize>()
            .with_context(|| format!("Invalid event count: {}", arg))?,
        None => parse_env_or("PRODUCER_EVENT_COUNT", 100usize).map_err(anyhow::Error::msg)?,
    };

    let producer = EventProducer::new(&kafka).context("Failed to create Kafka producer")?;

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::spawn_signal_listener(shutdown_tx);

    info!(count, topic = %kafka.topic, "Generating sample events");
    let sent = producer
        .generate_sample_events(count, shutdown_rx)
        .await
        .context("Failed to generate events")?;

    info!(sent, "Event generation completed");
    Ok(())
}
