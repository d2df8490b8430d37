//! Read API over ingested events
//!
//! Serves `GET /api/v1/events?page=&size=` plus health checks.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use ingest_service::config::Config;
use ingest_service::handlers;
use ingest_service::repository::{EventRepository, PgEventRepository};
use ingest_service::{logging, MIGRATOR};
use std::sync::Arc;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init_tracing(&config.logging);

    let pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    db_pool::run_migrations(&pool, &MIGRATOR)
        .await
        .context("Failed to run migrations")?;

    let repository: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool.clone()));
    let repository = web::Data::from(repository);
    let pool_data = web::Data::new(pool);

    let bind_address = format!("{}:{}", config.server.host, config.server.http_port);
    info!(address = %bind_address, "Starting events API");

    HttpServer::new(move || {
        App::new()
            .app_data(repository.clone())
            .app_data(pool_data.clone())
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(handlers::health))
            .route("/ready", web::get().to(handlers::ready))
            .configure(handlers::configure_events)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("Events API stopped");
    Ok(())
}
