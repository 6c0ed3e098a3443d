use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use greyhound::models::HealthResponse;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let session = state.session.lock().await;
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_tables: session.cached_tables(),
    };

    HttpResponse::Ok().json(response)
}

/// Drop every cached table so the next request fetches fresh data
pub async fn clear_cache(state: web::Data<Arc<AppState>>) -> impl Responder {
    let mut session = state.session.lock().await;
    session.invalidate();

    HttpResponse::NoContent().finish()
}
