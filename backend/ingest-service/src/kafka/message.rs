use rdkafka::message::Message;

use crate::error::{AppError, Result};

/// A fetched broker record, detached from the client that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn from_kafka<M: Message>(msg: &M) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    /// Store identity of the event carried by this message.
    pub fn sequence(&self) -> Result<u64> {
        u64::try_from(self.offset).map_err(|_| {
            AppError::Validation(format!(
                "message {}/{} has no valid offset ({})",
                self.topic, self.partition, self.offset
            ))
        })
    }
}
