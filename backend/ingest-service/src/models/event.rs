use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// A business event as carried on the topic and stored in `events`.
///
/// `sequence` is never trusted from the payload: the processor overwrites it
/// with the broker offset of the carrying message before anything is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Decode a wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }
        Ok(())
    }
}
