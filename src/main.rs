use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod handlers;

use greyhound::config::PipelineConfig;
use greyhound::pipeline::Session;
use handlers::{health, tables};

/// Application state shared across handlers
pub struct AppState {
    pub session: Mutex<Session>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(std::io::Error::other)?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{}:{}", host, port);

    let config = PipelineConfig::from_env();
    info!(
        "Feed: {} | Race cards: {} | Country: {}",
        config.feed_base_url, config.card_listing_url, config.country_code
    );

    let session = match Session::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start session: {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    let app_state = Arc::new(AppState {
        session: Mutex::new(session),
    });

    info!("Starting Greyhound API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/cache/clear", web::post().to(health::clear_cache))
            .route("/feed", web::get().to(tables::download_feed))
            .route("/prices", web::get().to(tables::download_prices))
            .route("/cards", web::get().to(tables::download_cards))
            .route("/consolidated", web::get().to(tables::download_consolidated))
    })
    .bind(&addr)?
    .run()
    .await
}
