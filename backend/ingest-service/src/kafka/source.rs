use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::{BrokerReader, OffsetCommitter, RawMessage};
use crate::error::Result;
use crate::services::dispatch::DispatchSender;
use crate::shutdown::{is_signalled, signalled};

/// Pulls records from the broker and hands them to the worker pool.
///
/// Owns the fetching side of the broker connection and the write end of the
/// dispatch channel. Offsets are committed through the same connection.
///
/// Workers finish out of order, so commits are filtered against the highest
/// offset already committed per partition: the group position never moves
/// backwards.
pub struct MessageSource<R> {
    reader: Arc<R>,
    sender: DispatchSender,
    fetch_error_backoff: Duration,
    closed: AtomicBool,
    high_water: Mutex<HashMap<(String, i32), i64>>,
}

impl<R: BrokerReader> MessageSource<R> {
    pub fn new(reader: Arc<R>, sender: DispatchSender, fetch_error_backoff: Duration) -> Self {
        Self {
            reader,
            sender,
            fetch_error_backoff,
            closed: AtomicBool::new(false),
            high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Run the fetch loop until shutdown or until the pool stops accepting.
    ///
    /// Fetch errors are logged and retried after a short pause. A message
    /// that could not be handed off before shutdown stays uncommitted and is
    /// redelivered on the next start.
    pub async fn start_consuming(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Message source started");

        loop {
            if is_signalled(&shutdown) {
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = signalled(&mut shutdown) => break,
                fetched = self.reader.fetch_message() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(e) => {
                    if is_signalled(&shutdown) {
                        break;
                    }
                    error!(error = %e, "Failed to fetch message, retrying");
                    tokio::select! {
                        _ = signalled(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.fetch_error_backoff) => {}
                    }
                    continue;
                }
            };

            let (topic, partition, offset) =
                (message.topic.clone(), message.partition, message.offset);
            debug!(topic = %topic, partition, offset, "Dispatching message");

            tokio::select! {
                biased;
                _ = signalled(&mut shutdown) => {
                    info!(
                        topic = %topic,
                        partition,
                        offset,
                        "Shutdown while dispatching, message left for redelivery"
                    );
                    break;
                }
                pushed = self.sender.push(message) => {
                    if pushed.is_err() {
                        warn!(
                            topic = %topic,
                            partition,
                            offset,
                            "Dispatch channel closed, stopping message source"
                        );
                        break;
                    }
                }
            }
        }

        info!("Message source stopped");
        Ok(())
    }

    /// Release the broker connection. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.reader.close().await
    }
}

#[async_trait]
impl<R> OffsetCommitter for MessageSource<R>
where
    R: BrokerReader + OffsetCommitter,
{
    async fn commit_offset(&self, message: &RawMessage) -> Result<()> {
        // Held across the broker call so concurrent commits cannot reorder.
        let mut high_water = self.high_water.lock().await;
        let key = (message.topic.clone(), message.partition);

        if let Some(&committed) = high_water.get(&key) {
            if committed >= message.offset {
                debug!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    committed,
                    "Offset already covered by a later commit"
                );
                return Ok(());
            }
        }

        self.reader.commit_offset(message).await?;
        high_water.insert(key, message.offset);
        Ok(())
    }

    async fn last_committed_offset(&self, partition: i32) -> Result<Option<i64>> {
        self.reader.last_committed_offset(partition).await
    }
}
