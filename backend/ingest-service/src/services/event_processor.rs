//! Per-message processing protocol.
//!
//! For every decoded event:
//!
//! 1. the event takes the broker offset of its message as `sequence`
//! 2. an event already stored under that sequence is acknowledged as a no-op
//! 3. the event is validated
//! 4. the row insert and the offset commit happen inside one store
//!    transaction, which is committed last
//!
//! Redelivered messages therefore never produce a second row, and an offset
//! is never committed for an event whose insert failed.
//!
//! The offset commit precedes the store commit. If the store commit then
//! fails with a non-transient error the broker has already moved past the
//! message; transient failures are retried from the top of step 4.
//!
//! [`EventProcessor::process_until`] can be abandoned up to the moment the
//! offset commit starts. From there on the offset commit and the store commit
//! always run to completion, so an abort never leaves a committed offset
//! without its row.

use resilience::{with_retry_if, RetryConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::kafka::{OffsetCommitter, RawMessage};
use crate::models::Event;
use crate::repository::{EventRepository, EventTransaction};
use crate::shutdown::signalled;

/// What `process` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Stored and its offset committed.
    Persisted,
    /// A row with this sequence already existed; nothing was written.
    Duplicate,
}

pub struct EventProcessor {
    repository: Arc<dyn EventRepository>,
    committer: Arc<dyn OffsetCommitter>,
    retry: RetryConfig,
}

impl EventProcessor {
    pub fn new(repository: Arc<dyn EventRepository>, committer: Arc<dyn OffsetCommitter>) -> Self {
        Self {
            repository,
            committer,
            retry: RetryConfig::disabled(),
        }
    }

    /// Retry transient store failures with the given policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn process(&self, event: Event, message: &RawMessage) -> Result<ProcessOutcome> {
        let (committing, _) = watch::channel(false);
        self.run(event, message, &committing).await
    }

    /// Like [`process`](Self::process), but returns [`AppError::Aborted`] as
    /// soon as `abort` fires, unless the offset commit has already started.
    pub async fn process_until(
        &self,
        event: Event,
        message: &RawMessage,
        mut abort: watch::Receiver<bool>,
    ) -> Result<ProcessOutcome> {
        let (committing, _) = watch::channel(false);
        let mut phase = committing.subscribe();

        tokio::select! {
            biased;
            result = self.run(event, message, &committing) => result,
            _ = async {
                signalled(&mut abort).await;
                // Never cut into a commit that is under way.
                let _ = phase.wait_for(|committing| !*committing).await;
            } => {
                debug!(offset = message.offset, "Processing abandoned before offset commit");
                Err(AppError::Aborted)
            }
        }
    }

    async fn run(
        &self,
        mut event: Event,
        message: &RawMessage,
        committing: &watch::Sender<bool>,
    ) -> Result<ProcessOutcome> {
        event.sequence = message.sequence()?;
        let sequence = event.sequence;

        let exists = with_retry_if(self.retry.clone(), AppError::is_transient, || {
            self.repository.exists(sequence)
        })
        .await
        .map_err(|e| AppError::DuplicateCheck(Box::new(e.into_inner())))?;

        if exists {
            debug!(sequence, "Event already stored, skipping");
            return Ok(ProcessOutcome::Duplicate);
        }

        event.validate()?;

        match with_retry_if(self.retry.clone(), AppError::is_transient, || {
            self.persist(&event, message, committing)
        })
        .await
        {
            Ok(()) => Ok(ProcessOutcome::Persisted),
            Err(e) => {
                let e = e.into_inner();
                if e.is_unique_violation() {
                    // Another worker stored the same redelivered message first.
                    debug!(sequence, "Concurrent insert won, treating as duplicate");
                    Ok(ProcessOutcome::Duplicate)
                } else {
                    Err(AppError::Persistence(Box::new(e)))
                }
            }
        }
    }

    async fn persist(
        &self,
        event: &Event,
        message: &RawMessage,
        committing: &watch::Sender<bool>,
    ) -> Result<()> {
        let mut tx = self.repository.begin().await?;

        if let Err(e) = tx.create(event).await {
            rollback(tx, event.sequence).await;
            return Err(e);
        }

        let _phase = CommitPhase::enter(committing);

        if let Err(e) = self.committer.commit_offset(message).await {
            rollback(tx, event.sequence).await;
            return Err(e);
        }

        tx.commit().await
    }
}

/// Marks the offset commit and store commit as in progress until dropped.
struct CommitPhase<'a>(&'a watch::Sender<bool>);

impl<'a> CommitPhase<'a> {
    fn enter(committing: &'a watch::Sender<bool>) -> Self {
        committing.send_replace(true);
        Self(committing)
    }
}

impl Drop for CommitPhase<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

async fn rollback(tx: Box<dyn EventTransaction>, sequence: u64) {
    if let Err(e) = tx.rollback().await {
        warn!(sequence, error = %e, "Rollback failed");
    }
}
