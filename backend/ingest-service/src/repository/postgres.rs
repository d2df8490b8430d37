use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{EventRepository, EventTransaction};
use crate::error::{AppError, Result};
use crate::models::{Event, Page, PaginatedEvents};

const INSERT_EVENT: &str = r#"
    INSERT INTO events (sequence, user_id, event_type, amount, metadata, created_at)
    VALUES ($1, $2, $3, CAST($4::FLOAT8 AS NUMERIC(12, 2)), $5, $6)
"#;

const SELECT_BY_SEQUENCE: &str = r#"
    SELECT sequence, user_id, event_type, amount::FLOAT8 AS amount, metadata, created_at
    FROM events
    WHERE sequence = $1
"#;

const SELECT_PAGE: &str = r#"
    SELECT sequence, user_id, event_type, amount::FLOAT8 AS amount, metadata, created_at
    FROM events
    ORDER BY sequence DESC
    LIMIT $1 OFFSET $2
"#;

/// PostgreSQL-backed [`EventRepository`].
#[derive(Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_db_sequence(sequence: u64) -> Result<i64> {
    i64::try_from(sequence)
        .map_err(|_| AppError::Validation(format!("sequence {} out of range", sequence)))
}

fn event_from_row(row: &PgRow) -> Result<Event> {
    let sequence: i64 = row.try_get("sequence")?;
    Ok(Event {
        sequence: u64::try_from(sequence)
            .map_err(|_| AppError::Internal(format!("negative sequence {} in store", sequence)))?,
        user_id: row.try_get("user_id")?,
        event_type: row.try_get("event_type")?,
        amount: row.try_get("amount")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_event<'e, E>(executor: E, event: &Event) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(INSERT_EVENT)
        .bind(to_db_sequence(event.sequence)?)
        .bind(&event.user_id)
        .bind(&event.event_type)
        .bind(event.amount)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn create(&self, event: &Event) -> Result<()> {
        insert_event(&self.pool, event).await?;
        debug!(sequence = event.sequence, "Event stored");
        Ok(())
    }

    async fn exists(&self, sequence: u64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE sequence = $1)")
                .bind(to_db_sequence(sequence)?)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn get_by_sequence(&self, sequence: u64) -> Result<Option<Event>> {
        let row = sqlx::query(SELECT_BY_SEQUENCE)
            .bind(to_db_sequence(sequence)?)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn list(&self, page: Page) -> Result<PaginatedEvents> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(SELECT_PAGE)
            .bind(i64::from(page.size))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let events = rows.iter().map(event_from_row).collect::<Result<Vec<_>>>()?;

        Ok(PaginatedEvents::new(events, total.max(0) as u64, page))
    }

    async fn begin(&self) -> Result<Box<dyn EventTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgEventTransaction { tx }))
    }
}

/// An open PostgreSQL transaction. Rolled back on drop unless committed.
pub struct PgEventTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EventTransaction for PgEventTransaction {
    async fn create(&mut self, event: &Event) -> Result<()> {
        insert_event(&mut *self.tx, event).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
