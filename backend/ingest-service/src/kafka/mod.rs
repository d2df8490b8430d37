//! Broker-facing side of the pipeline.

mod message;
mod producer;
mod reader;
mod source;

pub use message::RawMessage;
pub use producer::{sample_event, EventProducer, SAMPLE_EVENT_TYPES};
pub use reader::KafkaReader;
pub use source::MessageSource;

use async_trait::async_trait;

use crate::error::Result;

/// Pull side of a broker connection.
#[async_trait]
pub trait BrokerReader: Send + Sync {
    /// Wait for the next record of the subscription.
    async fn fetch_message(&self) -> Result<RawMessage>;

    /// Release the connection. Fetches after close fail.
    async fn close(&self) -> Result<()>;
}

/// Records consumption progress on the broker.
#[async_trait]
pub trait OffsetCommitter: Send + Sync {
    /// Mark `message` and everything before it on its partition as processed.
    async fn commit_offset(&self, message: &RawMessage) -> Result<()>;

    /// Offset of the last processed record on `partition`, if any was committed.
    async fn last_committed_offset(&self, partition: i32) -> Result<Option<i64>>;
}
