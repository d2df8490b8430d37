use actix_web::{web, HttpResponse};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::PageRequest;
use crate::repository::EventRepository;

/// List stored events, newest sequence first
pub async fn list_events(
    repository: web::Data<dyn EventRepository>,
    query: web::Query<PageRequest>,
) -> Result<HttpResponse> {
    let page = query.validate()?;
    let response = repository.list(page).await?;

    debug!(
        page = response.page,
        size = response.size,
        returned = response.events.len(),
        total = response.total,
        "Listed events"
    );

    Ok(HttpResponse::Ok().json(response))
}

/// Get a single event by sequence
pub async fn get_event(
    repository: web::Data<dyn EventRepository>,
    sequence: web::Path<u64>,
) -> Result<HttpResponse> {
    let sequence = sequence.into_inner();
    match repository.get_by_sequence(sequence).await? {
        Some(event) => Ok(HttpResponse::Ok().json(event)),
        None => Err(AppError::NotFound(format!("event {} not found", sequence))),
    }
}
