use actix_web::{web, HttpResponse};
use sqlx::PgPool;
use tracing::warn;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Ready once the database answers.
pub async fn ready(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().body("READY"),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body("NOT READY")
        }
    }
}
