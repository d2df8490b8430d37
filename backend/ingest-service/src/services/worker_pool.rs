//! Fixed-size pool of workers draining the dispatch channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatch::DispatchReceiver;
use super::event_processor::{EventProcessor, ProcessOutcome};
use crate::error::{AppError, Result};
use crate::kafka::RawMessage;
use crate::models::Event;
use crate::shutdown::signalled;

/// Runs `worker_count` workers, each pulling one message at a time.
///
/// Shutdown paths:
/// - the shared shutdown signal makes idle workers exit at once, while a
///   worker in the middle of a message finishes it first
/// - [`WorkerPool::stop`] closes the channel and reports when every worker
///   has exited
/// - [`WorkerPool::force_close`] additionally abandons in-flight messages
///   that have not reached their offset commit
pub struct WorkerPool {
    receiver: Arc<DispatchReceiver>,
    processor: Arc<EventProcessor>,
    worker_count: usize,
    live: Arc<watch::Sender<usize>>,
    abort: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl WorkerPool {
    /// Fails when `worker_count` is zero.
    pub fn new(
        receiver: DispatchReceiver,
        processor: Arc<EventProcessor>,
        worker_count: usize,
    ) -> Result<Self> {
        if worker_count == 0 {
            return Err(AppError::Config(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let (live, _) = watch::channel(0usize);
        let (abort, _) = watch::channel(false);
        Ok(Self {
            receiver: Arc::new(receiver),
            processor,
            worker_count,
            live: Arc::new(live),
            abort,
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers that have been spawned and not yet exited.
    pub fn live_workers(&self) -> usize {
        *self.live.borrow()
    }

    /// Spawn the workers. Later calls are ignored.
    pub fn start(&self, shutdown: watch::Receiver<bool>) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Worker pool already started");
            return;
        }

        let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for worker_id in 0..self.worker_count {
            self.live.send_modify(|n| *n += 1);
            let worker = Worker {
                id: worker_id,
                receiver: Arc::clone(&self.receiver),
                processor: Arc::clone(&self.processor),
                shutdown: shutdown.clone(),
                abort: self.abort.subscribe(),
                _live: LiveGuard(Arc::clone(&self.live)),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        info!(worker_count = self.worker_count, "Worker pool started");
    }

    /// Close the dispatch channel and return a future that resolves once
    /// every worker has exited. The channel is only closed by the first call.
    pub fn stop(&self) -> impl Future<Output = ()> + Send + 'static {
        if self.stopping.swap(true, Ordering::AcqRel) {
            warn!("Worker pool stop requested more than once");
        } else {
            self.receiver.close();
            info!("Worker pool draining");
        }
        self.completion()
    }

    /// Abandon in-flight messages and wait for every worker to exit.
    ///
    /// Does not close the channel. Abandoned messages keep their offsets
    /// uncommitted; their open store transactions are rolled back on drop.
    pub async fn force_close(&self) {
        self.abort.send_replace(true);
        self.completion().await;

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|p| p.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "Worker panicked");
                }
            }
        }
        info!("Worker pool closed");
    }

    fn completion(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut live = self.live.subscribe();
        async move {
            let _ = live.wait_for(|n| *n == 0).await;
        }
    }
}

/// Decrements the live-worker count when a worker exits, panics included.
struct LiveGuard(Arc<watch::Sender<usize>>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

struct Worker {
    id: usize,
    receiver: Arc<DispatchReceiver>,
    processor: Arc<EventProcessor>,
    shutdown: watch::Receiver<bool>,
    abort: watch::Receiver<bool>,
    _live: LiveGuard,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker_id = self.id, "Worker started");

        loop {
            let message = tokio::select! {
                biased;
                _ = signalled(&mut self.abort) => break,
                _ = signalled(&mut self.shutdown) => break,
                message = self.receiver.pop() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let event = match Event::decode(&message.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        worker_id = self.id,
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Dropping undecodable message"
                    );
                    continue;
                }
            };

            // An abort only preempts processing before the offset commit starts.
            let result = self
                .processor
                .process_until(event, &message, self.abort.clone())
                .await;
            if matches!(result, Err(AppError::Aborted)) {
                warn!(
                    worker_id = self.id,
                    offset = message.offset,
                    "Forced shutdown abandoned in-flight message"
                );
                break;
            }
            self.report(&message, result);
        }

        debug!(worker_id = self.id, "Worker stopped");
    }

    fn report(&self, message: &RawMessage, result: Result<ProcessOutcome>) {
        match result {
            Ok(ProcessOutcome::Persisted) => info!(
                worker_id = self.id,
                topic = %message.topic,
                partition = message.partition,
                sequence = message.offset,
                "Event persisted"
            ),
            Ok(ProcessOutcome::Duplicate) => debug!(
                worker_id = self.id,
                sequence = message.offset,
                "Duplicate event skipped"
            ),
            Err(e) => error!(
                worker_id = self.id,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to process event"
            ),
        }
    }
}
