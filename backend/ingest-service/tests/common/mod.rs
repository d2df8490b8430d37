//! In-memory fakes for the broker and the event store.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use ingest_service::error::{AppError, Result};
use ingest_service::kafka::{BrokerReader, MessageSource, OffsetCommitter, RawMessage};
use ingest_service::models::{Event, Page, PaginatedEvents};
use ingest_service::repository::{EventRepository, EventTransaction};
use ingest_service::services::{dispatch_channel, EventProcessor, WorkerPool};
use ingest_service::shutdown;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn event(user_id: &str) -> Event {
    Event {
        sequence: 0,
        user_id: user_id.to_string(),
        event_type: "purchase".to_string(),
        amount: 42.5,
        metadata: json!({"product_id": "p_1", "location": "IR"}),
        created_at: Utc::now(),
    }
}

/// A broker record carrying an encoded event for `user_id`.
pub fn event_message(offset: i64, user_id: &str) -> RawMessage {
    RawMessage {
        topic: "events".to_string(),
        partition: 0,
        offset,
        key: Some(b"kafka-bridge".to_vec()),
        payload: event(user_id).encode().unwrap(),
    }
}

pub fn raw_message(offset: i64, payload: &[u8]) -> RawMessage {
    RawMessage {
        topic: "events".to_string(),
        partition: 0,
        offset,
        key: None,
        payload: payload.to_vec(),
    }
}

// ============================================
// Broker
// ============================================

/// Serves queued records, waiting for more once the queue is empty.
/// Commits follow broker semantics: the last one wins, even when lower.
#[derive(Default)]
pub struct ScriptedReader {
    script: Mutex<VecDeque<RawMessage>>,
    more: Notify,
    committed: Arc<Mutex<Vec<i64>>>,
    commit_delay: Option<Duration>,
    commits_started: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedReader {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            script: Mutex::new(messages.into()),
            ..Default::default()
        }
    }

    /// Commits run on a blocking thread and take `delay` before the broker
    /// records them, like a synchronous librdkafka commit.
    pub fn with_commit_delay(messages: Vec<RawMessage>, delay: Duration) -> Self {
        Self {
            commit_delay: Some(delay),
            ..Self::new(messages)
        }
    }

    /// Queue `message` as if the broker delivered it again.
    pub fn deliver(&self, message: RawMessage) {
        self.script.lock().unwrap().push_back(message);
        self.more.notify_one();
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn commits_started(&self) -> usize {
        self.commits_started.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }

    pub async fn wait_for_commits(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.committed.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for offset commits");
    }

    pub async fn wait_for_fetches(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.fetches() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for fetches");
    }
}

#[async_trait]
impl BrokerReader for ScriptedReader {
    async fn fetch_message(&self) -> Result<RawMessage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        loop {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(message) => return Ok(message),
                None => self.more.notified().await,
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl OffsetCommitter for ScriptedReader {
    async fn commit_offset(&self, message: &RawMessage) -> Result<()> {
        self.commits_started.fetch_add(1, Ordering::SeqCst);
        let committed = Arc::clone(&self.committed);
        let offset = message.offset;

        match self.commit_delay {
            Some(delay) => tokio::task::spawn_blocking(move || {
                std::thread::sleep(delay);
                committed.lock().unwrap().push(offset);
            })
            .await
            .map_err(|e| AppError::Internal(e.to_string())),
            None => {
                committed.lock().unwrap().push(offset);
                Ok(())
            }
        }
    }

    async fn last_committed_offset(&self, _partition: i32) -> Result<Option<i64>> {
        Ok(self.committed.lock().unwrap().last().copied())
    }
}

// ============================================
// Event store
// ============================================

#[derive(Default)]
struct StoreState {
    rows: Mutex<BTreeMap<u64, Event>>,
    gate: Option<Arc<Semaphore>>,
    inserts_started: AtomicUsize,
}

/// Event store kept in a map. A gated store parks every transactional
/// insert until [`InMemoryEventRepository::release`] lets it through.
#[derive(Clone, Default)]
pub struct InMemoryEventRepository {
    state: Arc<StoreState>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            state: Arc::new(StoreState {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Default::default()
            }),
        }
    }

    pub fn release(&self, inserts: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(inserts);
        }
    }

    /// Store `event` directly under its own sequence.
    pub fn seed(&self, event: Event) {
        self.state.rows.lock().unwrap().insert(event.sequence, event);
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.state.rows.lock().unwrap().keys().copied().collect()
    }

    pub fn inserts_started(&self) -> usize {
        self.state.inserts_started.load(Ordering::SeqCst)
    }

    pub async fn wait_for_rows(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.state.rows.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for stored rows");
    }

    pub async fn wait_for_inserts(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.inserts_started() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for inserts");
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn create(&self, event: &Event) -> Result<()> {
        self.seed(event.clone());
        Ok(())
    }

    async fn exists(&self, sequence: u64) -> Result<bool> {
        Ok(self.state.rows.lock().unwrap().contains_key(&sequence))
    }

    async fn get_by_sequence(&self, sequence: u64) -> Result<Option<Event>> {
        Ok(self.state.rows.lock().unwrap().get(&sequence).cloned())
    }

    async fn list(&self, page: Page) -> Result<PaginatedEvents> {
        let rows = self.state.rows.lock().unwrap();
        let events = rows
            .values()
            .rev()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect();
        Ok(PaginatedEvents::new(events, rows.len() as u64, page))
    }

    async fn begin(&self) -> Result<Box<dyn EventTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }
}

pub struct InMemoryTransaction {
    state: Arc<StoreState>,
    staged: Vec<Event>,
}

#[async_trait]
impl EventTransaction for InMemoryTransaction {
    async fn create(&mut self, event: &Event) -> Result<()> {
        self.state.inserts_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.state.gate {
            gate.acquire()
                .await
                .map_err(|_| AppError::Internal("store gate closed".into()))?
                .forget();
        }
        self.staged.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { state, staged } = *self;
        let mut rows = state.rows.lock().unwrap();
        for event in staged {
            if rows.contains_key(&event.sequence) {
                return Err(AppError::Internal(format!(
                    "sequence {} already stored",
                    event.sequence
                )));
            }
            rows.insert(event.sequence, event);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// ============================================
// Pipeline
// ============================================

/// Source, dispatch channel and worker pool wired the way the consumer
/// binary wires them, over in-memory fakes.
pub struct TestPipeline {
    pub reader: Arc<ScriptedReader>,
    pub repository: InMemoryEventRepository,
    pub source: Arc<MessageSource<ScriptedReader>>,
    pub workers: WorkerPool,
    pub shutdown_tx: watch::Sender<bool>,
    source_task: JoinHandle<()>,
}

impl TestPipeline {
    pub fn start(
        messages: Vec<RawMessage>,
        repository: InMemoryEventRepository,
        worker_count: usize,
    ) -> Self {
        Self::with_reader(ScriptedReader::new(messages), repository, worker_count)
    }

    pub fn with_reader(
        reader: ScriptedReader,
        repository: InMemoryEventRepository,
        worker_count: usize,
    ) -> Self {
        let reader = Arc::new(reader);
        let (sender, receiver) = dispatch_channel();
        let source = Arc::new(MessageSource::new(
            Arc::clone(&reader),
            sender,
            Duration::from_millis(5),
        ));

        let processor = Arc::new(EventProcessor::new(
            Arc::new(repository.clone()),
            source.clone(),
        ));
        let workers = WorkerPool::new(receiver, processor, worker_count).unwrap();

        let (shutdown_tx, shutdown_rx) = shutdown::channel();
        workers.start(shutdown_rx.clone());

        let source_task = tokio::spawn({
            let source = Arc::clone(&source);
            async move {
                source.start_consuming(shutdown_rx).await.unwrap();
            }
        });

        Self {
            reader,
            repository,
            source,
            workers,
            shutdown_tx,
            source_task,
        }
    }

    /// Signal shutdown, drain or force the workers, then release the broker.
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let _ = resilience::with_timeout(grace, self.workers.stop()).await;
        self.workers.force_close().await;
        tokio::time::timeout(WAIT, self.source_task)
            .await
            .expect("source did not stop")
            .unwrap();
        self.source.close().await.unwrap();
    }
}
