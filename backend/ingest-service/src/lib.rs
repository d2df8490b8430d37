//! Event ingest service
//!
//! Consumes business events from a Kafka topic and stores each one exactly
//! once in PostgreSQL, committing the broker offset only after the event is
//! stored.
//!
//! Pipeline:
//!
//! ```text
//! broker -> MessageSource -> dispatch channel -> WorkerPool (N) -> EventProcessor
//!                                                                  |-> EventRepository
//!                                                                  `-> OffsetCommitter
//! ```
//!
//! The dispatch channel has no buffer, so the source only fetches as fast as
//! workers free up. Stored events are served by the read API in `handlers`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod repository;
pub mod services;
pub mod shutdown;

/// Embedded schema migrations for the `events` table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
