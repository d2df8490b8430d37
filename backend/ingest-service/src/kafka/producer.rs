use chrono::Utc;
use rand::Rng;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::{AppError, Result};
use crate::models::Event;
use crate::shutdown::{is_signalled, signalled};

pub const SAMPLE_EVENT_TYPES: [&str; 5] = ["purchase", "view", "login", "logout", "signup"];

const MESSAGE_KEY: &str = "kafka-bridge";
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_INTERVAL: Duration = Duration::from_millis(10);

/// Publishes events onto the ingest topic.
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("linger.ms", "10")
            .set("message.timeout.ms", "30000")
            .create()?;

        info!(
            brokers = %config.bootstrap_servers(),
            topic = %config.topic,
            "Event producer initialized"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    /// Publish one event and wait for the broker acknowledgement.
    pub async fn publish(&self, event: &Event) -> Result<(i32, i64)> {
        let payload = event.encode()?;
        let record = FutureRecord::to(&self.topic)
            .key(MESSAGE_KEY)
            .payload(&payload);

        self.producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map_err(|(err, _)| AppError::Kafka(err))
    }

    /// Publish `count` random events, pausing briefly between sends.
    ///
    /// Stops early when `shutdown` fires and returns how many were sent.
    pub async fn generate_sample_events(
        &self,
        count: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<usize> {
        for sent in 0..count {
            if is_signalled(&shutdown) {
                info!(sent, "Sample generation interrupted");
                return Ok(sent);
            }

            let event = sample_event(&mut rand::thread_rng());
            let (partition, offset) = self.publish(&event).await?;
            debug!(partition, offset, user_id = %event.user_id, "Sample event published");

            tokio::select! {
                _ = signalled(&mut shutdown) => {
                    info!(sent = sent + 1, "Sample generation interrupted");
                    return Ok(sent + 1);
                }
                _ = tokio::time::sleep(SEND_INTERVAL) => {}
            }
        }

        Ok(count)
    }
}

/// A random event shaped like real traffic.
pub fn sample_event<R: Rng>(rng: &mut R) -> Event {
    Event {
        sequence: 0,
        user_id: format!("user_{}", rng.gen_range(0..10_000)),
        event_type: SAMPLE_EVENT_TYPES[rng.gen_range(0..SAMPLE_EVENT_TYPES.len())].to_string(),
        amount: rng.gen::<f64>() * 1000.0,
        metadata: json!({
            "product_id": format!("p_{}", rng.gen_range(0..100)),
            "location": "IR",
        }),
        created_at: Utc::now(),
    }
}
