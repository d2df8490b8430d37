//! Event store port and its PostgreSQL adapter.

mod postgres;

pub use postgres::{PgEventRepository, PgEventTransaction};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Event, Page, PaginatedEvents};

/// Durable storage for events, keyed by `sequence`.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert outside of any explicit transaction.
    async fn create(&self, event: &Event) -> Result<()>;

    async fn exists(&self, sequence: u64) -> Result<bool>;

    async fn get_by_sequence(&self, sequence: u64) -> Result<Option<Event>>;

    /// Page through stored events, highest sequence first.
    async fn list(&self, page: Page) -> Result<PaginatedEvents>;

    /// Open a transactional scope. Nothing written through it is visible
    /// until [`EventTransaction::commit`] succeeds; dropping it uncommitted
    /// discards the writes.
    async fn begin(&self) -> Result<Box<dyn EventTransaction>>;
}

/// Writes scoped to one store transaction.
#[async_trait]
pub trait EventTransaction: Send {
    async fn create(&mut self, event: &Event) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
