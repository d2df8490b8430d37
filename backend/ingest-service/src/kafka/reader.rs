use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::{BrokerReader, OffsetCommitter, RawMessage};
use crate::config::KafkaConfig;
use crate::error::{AppError, Result};

const COMMITTED_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// rdkafka consumer with manual offset management.
///
/// Offsets are only ever committed through [`OffsetCommitter::commit_offset`],
/// after the carried event is durably stored. Closing unsubscribes and drops
/// the consumer, which leaves the group once in-flight calls finish.
pub struct KafkaReader {
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
    topic: String,
}

impl KafkaReader {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("fetch.min.bytes", config.min_fetch_bytes.to_string())
            .set("fetch.max.bytes", config.max_fetch_bytes.to_string())
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.bootstrap_servers(),
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka reader initialized"
        );

        Ok(Self {
            consumer: Mutex::new(Some(Arc::new(consumer))),
            topic: config.topic.clone(),
        })
    }

    fn consumer(&self) -> Result<Arc<StreamConsumer>> {
        self.consumer
            .lock()
            .map_err(|_| AppError::Internal("Kafka reader lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| AppError::Internal("Kafka reader is closed".to_string()))
    }

    /// librdkafka commits block on a broker round trip.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StreamConsumer) -> Result<T> + Send + 'static,
    {
        let consumer = self.consumer()?;
        tokio::task::spawn_blocking(move || f(&*consumer))
            .await
            .map_err(|e| AppError::Internal(format!("Kafka blocking task failed: {e}")))?
    }
}

#[async_trait]
impl BrokerReader for KafkaReader {
    async fn fetch_message(&self) -> Result<RawMessage> {
        let consumer = self.consumer()?;
        let msg = consumer.recv().await?;
        Ok(RawMessage::from_kafka(&msg))
    }

    async fn close(&self) -> Result<()> {
        let consumer = self
            .consumer
            .lock()
            .map_err(|_| AppError::Internal("Kafka reader lock poisoned".to_string()))?
            .take();

        if let Some(consumer) = consumer {
            consumer.unsubscribe();
            drop(consumer);
            info!(topic = %self.topic, "Kafka reader closed");
        }
        Ok(())
    }
}

#[async_trait]
impl OffsetCommitter for KafkaReader {
    async fn commit_offset(&self, message: &RawMessage) -> Result<()> {
        // Kafka stores the position of the next record to read.
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;

        self.blocking(move |consumer| {
            consumer
                .commit(&tpl, CommitMode::Sync)
                .map_err(|e| AppError::OffsetCommit(e.to_string()))
        })
        .await?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Offset committed"
        );
        Ok(())
    }

    async fn last_committed_offset(&self, partition: i32) -> Result<Option<i64>> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&self.topic, partition);
        let topic = self.topic.clone();

        self.blocking(move |consumer| {
            let committed = consumer.committed_offsets(tpl, COMMITTED_LOOKUP_TIMEOUT)?;
            let position = committed
                .find_partition(&topic, partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(next) if next > 0 => Some(next - 1),
                    _ => None,
                });
            Ok(position)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> KafkaConfig {
        KafkaConfig {
            brokers: vec!["127.0.0.1:1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_close_releases_consumer() {
        let reader = KafkaReader::new(&unreachable_broker()).unwrap();
        assert!(reader.consumer.lock().unwrap().is_some());

        reader.close().await.unwrap();
        reader.close().await.unwrap();

        assert!(reader.consumer.lock().unwrap().is_none());
        assert!(reader.fetch_message().await.is_err());
        assert!(reader.last_committed_offset(0).await.is_err());
    }
}
