/// HTTP handlers for the read API
pub mod events;
pub mod health;

pub use events::{get_event, list_events};
pub use health::{health, ready};

use actix_web::web;

/// Event routes. `/kafka-bridge/apis/v1/records` is kept for existing clients.
pub fn configure_events(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/events")
            .route("", web::get().to(list_events))
            .route("/{sequence}", web::get().to(get_event)),
    )
    .route("/kafka-bridge/apis/v1/records", web::get().to(list_events));
}
