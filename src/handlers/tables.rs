use actix_web::{http::header, web, HttpResponse};
use chrono::Datelike;
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use greyhound::data::TableExport;
use greyhound::error::{validate_date_param, AppError};
use greyhound::pipeline::today;

/// `?date=YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

/// Render a table as a CSV download
fn csv_attachment<T: TableExport + ?Sized>(table: &T) -> Result<HttpResponse, AppError> {
    let body = table
        .csv_bytes()
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", table.file_name()),
        ))
        .body(body))
}

/// Raw BSP feed (Betfair.csv)
pub async fn download_feed(
    state: web::Data<Arc<AppState>>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, AppError> {
    let date = validate_date_param(&query.date)?;
    let mut session = state.session.lock().await;

    let batch = session.load_feed(date, today()).await?;
    csv_attachment(batch.as_ref())
}

/// Normalised price table (Betfair_processed.csv)
pub async fn download_prices(
    state: web::Data<Arc<AppState>>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, AppError> {
    let date = validate_date_param(&query.date)?;
    let today = today();
    let mut session = state.session.lock().await;

    // Surface feed errors as themselves rather than as missing data
    session.load_feed(date, today).await?;
    let table = session.price_table(date, today).await?;
    csv_attachment(table.as_ref())
}

/// Exploded race cards (Greyhound.csv)
pub async fn download_cards(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, AppError> {
    let year = today().year();
    let mut session = state.session.lock().await;

    session.scrape_cards(year).await?;
    let table = session.runner_cards(year).await?;
    csv_attachment(table.as_ref())
}

/// Prices joined with tips (Consolidated_output.csv)
pub async fn download_consolidated(
    state: web::Data<Arc<AppState>>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, AppError> {
    let date = validate_date_param(&query.date)?;
    let today = today();
    let mut session = state.session.lock().await;

    session.require_inputs(date, today).await?;
    let table = session.consolidated(date, today).await?;
    csv_attachment(table.as_ref())
}
